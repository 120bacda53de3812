//! Outbound request dispatch

use crossbeam_channel::{Sender, TrySendError};

use crate::error::RequestError;
use crate::protocol::external::ExternalMessage;

/// Hands a request message to whatever carries it to the peer
pub trait RequestDispatcher: Send {
    fn dispatch(&mut self, message: ExternalMessage) -> Result<(), RequestError>;
}

/// Dispatcher feeding a bounded outbound channel
///
/// The channel is drained by the transport side; a full or closed channel
/// fails the dispatch without blocking.
#[derive(Clone)]
pub struct ChannelDispatcher {
    tx: Sender<ExternalMessage>,
}

impl ChannelDispatcher {
    pub fn new(tx: Sender<ExternalMessage>) -> Self {
        Self { tx }
    }
}

impl RequestDispatcher for ChannelDispatcher {
    fn dispatch(&mut self, message: ExternalMessage) -> Result<(), RequestError> {
        self.tx.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => RequestError::DispatchFailed("outbound queue full".into()),
            TrySendError::Disconnected(_) => {
                RequestError::DispatchFailed("outbound channel closed".into())
            }
        })
    }
}
