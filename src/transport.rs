//! Frame transport
//!
//! The bridge hands complete JSON frames to a [`Transport`]; framing and the
//! physical link (serial, USB CDC, a pipe) are the transport's business.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::TransportError;

/// Outbound text-frame link to the peer
pub trait Transport: Send {
    fn send_frame(&mut self, frame: &str) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;
}

/// In-memory transport recording every frame sent
///
/// Clones share the recorded frames and the connection flag.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    sent: Arc<Mutex<Vec<String>>>,
    disconnected: Arc<AtomicBool>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connected(&self, connected: bool) {
        self.disconnected.store(!connected, Ordering::SeqCst);
    }

    pub fn sent_frames(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Remove and return every frame sent so far
    pub fn take_frames(&self) -> Vec<String> {
        std::mem::take(&mut *self.sent.lock())
    }
}

impl Transport for MemoryTransport {
    fn send_frame(&mut self, frame: &str) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.sent.lock().push(frame.to_string());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.disconnected.load(Ordering::SeqCst)
    }
}

/// Newline-delimited frames over any writer (stdout, a serial port file)
pub struct LineTransport<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> LineTransport<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> Transport for LineTransport<W> {
    fn send_frame(&mut self, frame: &str) -> Result<(), TransportError> {
        writeln!(self.writer, "{}", frame)
            .and_then(|_| self.writer.flush())
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_transport_records_frames() {
        let transport = MemoryTransport::new();
        let mut handle = transport.clone();
        handle.send_frame("{\"a\":1}").unwrap();

        assert_eq!(transport.sent_frames(), vec!["{\"a\":1}".to_string()]);
        assert_eq!(transport.take_frames().len(), 1);
        assert!(transport.sent_frames().is_empty());
    }

    #[test]
    fn test_memory_transport_disconnected() {
        let mut transport = MemoryTransport::new();
        transport.set_connected(false);
        assert_eq!(
            transport.send_frame("x"),
            Err(TransportError::NotConnected)
        );
    }

    #[test]
    fn test_line_transport_appends_newline() {
        let mut transport = LineTransport::new(Vec::new());
        transport.send_frame("one").unwrap();
        transport.send_frame("two").unwrap();
        assert_eq!(transport.into_inner(), b"one\ntwo\n".to_vec());
    }
}
