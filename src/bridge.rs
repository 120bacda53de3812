//! Message bridge between the transport and the core
//!
//! Inbound: frame → codec → ignore filter → router → audio manager or
//! request tracker. Outbound: status updates, status requests and asset
//! requests are serialized, checked against the payload ceiling and handed
//! to the transport.

use crossbeam_channel::{bounded, Receiver};

use crate::audio::manager::SharedAudioManager;
use crate::clock::SharedClock;
use crate::config::{AppConfig, ProtocolConfig};
use crate::constants::OUTBOUND_QUEUE_CAPACITY;
use crate::error::{ProtocolError, RequestError, Result, TransportError};
use crate::protocol::codec::{
    check_payload_size, create_status_response, parse_external_message,
    serialize_external_message, truncate_for_log,
};
use crate::protocol::data::{AssetResponseData, AudioStatusData};
use crate::protocol::external::{generate_request_id, ExternalMessage};
use crate::protocol::internal::{InternalMessage, InternalPayload};
use crate::protocol::types::{fields, reasons, ExternalMessageType};
use crate::requests::{ChannelDispatcher, RequestTracker};
use crate::router::{external_to_internal, internal_to_external, should_ignore_message};
use crate::transport::Transport;

/// Bridge statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BridgeStats {
    pub frames_received: u64,
    /// Loopback or unvalidated messages
    pub frames_ignored: u64,
    /// Oversized or unparseable frames
    pub frames_rejected: u64,
    pub frames_sent: u64,
    pub send_failures: u64,
    pub status_updates_applied: u64,
    pub status_requests_answered: u64,
}

pub struct MessageBridge<T: Transport> {
    device_id: String,
    protocol: ProtocolConfig,
    clock: SharedClock,
    audio: SharedAudioManager,
    requests: RequestTracker<ChannelDispatcher>,
    outbound_rx: Receiver<ExternalMessage>,
    transport: T,
    last_activity_ms: Option<u64>,
    stats: BridgeStats,
}

impl<T: Transport> MessageBridge<T> {
    pub fn new(
        config: &AppConfig,
        audio: SharedAudioManager,
        transport: T,
        clock: SharedClock,
    ) -> Self {
        let (tx, outbound_rx) = bounded(OUTBOUND_QUEUE_CAPACITY);
        let requests = RequestTracker::new(
            ChannelDispatcher::new(tx),
            config.requests.clone(),
            &config.device.device_id,
            clock.clone(),
        );

        Self {
            device_id: config.device.device_id.clone(),
            protocol: config.protocol.clone(),
            clock,
            audio,
            requests,
            outbound_rx,
            transport,
            last_activity_ms: None,
            stats: BridgeStats::default(),
        }
    }

    // === Inbound ===

    /// Process one inbound frame
    ///
    /// Ignored messages return `Ok`. Oversized and malformed frames are
    /// counted and returned as errors; no state is touched.
    pub fn handle_frame(&mut self, frame: &str) -> Result<()> {
        self.stats.frames_received += 1;

        if let Err(e) = check_payload_size(frame, self.protocol.max_payload_size) {
            self.stats.frames_rejected += 1;
            tracing::warn!("Rejected inbound frame: {}", e);
            return Err(e.into());
        }

        let message = match parse_external_message(frame, self.clock.as_ref()) {
            Ok(message) => message,
            Err(e) => {
                self.stats.frames_rejected += 1;
                tracing::warn!(
                    "Failed to parse frame ({}): {}",
                    e,
                    truncate_for_log(frame, self.protocol.log_truncate_length)
                );
                return Err(e.into());
            }
        };
        self.last_activity_ms = Some(self.clock.now_ms());

        if should_ignore_message(&message, &self.device_id) {
            self.stats.frames_ignored += 1;
            return Ok(());
        }

        tracing::debug!(
            "Received {} (requestId={}) from {}",
            message.message_type,
            message.request_id,
            message.device_id
        );

        match message.message_type {
            ExternalMessageType::GetStatus => self.answer_status_request(&message)?,
            ExternalMessageType::StatusUpdate | ExternalMessageType::StatusMessage => {
                self.handle_status(message)
            }
            ExternalMessageType::AssetResponse => {
                let request_id = message.request_id.clone();
                self.requests.complete(&request_id, message);
            }
            ExternalMessageType::GetAssets | ExternalMessageType::SessionUpdate => {
                tracing::debug!("No handler for {}", message.message_type);
            }
            ExternalMessageType::Invalid => {}
        }

        self.flush_outbound();
        Ok(())
    }

    fn handle_status(&mut self, message: ExternalMessage) {
        for internal in external_to_internal(&message) {
            self.apply_internal(internal);
        }

        let correlation = message
            .get_str(fields::ORIGINATING_REQUEST_ID)
            .unwrap_or_default()
            .to_string();
        if !correlation.is_empty() && self.requests.is_pending(&correlation) {
            self.requests.complete(&correlation, message);
        }
    }

    fn apply_internal(&mut self, internal: InternalMessage) {
        match internal.payload {
            InternalPayload::AudioStateUpdate(status) => {
                self.audio.lock().on_audio_status_received(&status);
                self.stats.status_updates_applied += 1;
            }
            other => {
                tracing::debug!("Unhandled internal message {}", other.message_type());
            }
        }
    }

    fn answer_status_request(&mut self, request: &ExternalMessage) -> Result<()> {
        let mut data = self.audio.lock().build_status_update(&self.device_id);
        data.reason = reasons::STATUS_REQUEST.to_string();
        data.originating_request_id = request.request_id.clone();

        let response = create_status_response(&data, &self.device_id, &generate_request_id())?;
        tracing::info!(
            "Answering status request {} from {}",
            request.request_id,
            request.device_id
        );
        self.send_message(&response)?;
        self.stats.status_requests_answered += 1;
        Ok(())
    }

    // === Outbound ===

    /// Publish the local view of the mixer as a STATUS_MESSAGE
    pub fn publish_status_update(&mut self) -> Result<()> {
        let data = self.audio.lock().build_status_update(&self.device_id);
        let internal = InternalMessage::audio_state_update(data, self.clock.now_ms());
        let message = internal_to_external(&internal, &self.device_id);
        if message.message_type == ExternalMessageType::Invalid {
            return Err(ProtocolError::SerializationFailed("status update".into()).into());
        }
        self.send_message(&message)
    }

    /// Ask the host for a full snapshot
    ///
    /// The reply is also merged into the audio state like any status message.
    pub fn request_status<F>(&mut self, callback: F) -> String
    where
        F: FnOnce(std::result::Result<AudioStatusData, RequestError>) + Send + 'static,
    {
        let request_id = self.requests.submit_status_request(callback, None);
        self.flush_outbound();
        request_id
    }

    /// Ask the host for the logo of `process_name`
    pub fn request_asset<F>(&mut self, process_name: &str, callback: F) -> String
    where
        F: FnOnce(std::result::Result<AssetResponseData, RequestError>) + Send + 'static,
    {
        let request_id = self
            .requests
            .submit_asset_request(process_name, callback, None);
        self.flush_outbound();
        request_id
    }

    /// Periodic housekeeping: expire overdue requests and send whatever
    /// the tracker dispatched in response
    pub fn tick(&mut self) -> usize {
        let expired = self.requests.timeout_expired_requests();
        self.flush_outbound();
        expired
    }

    /// Serialize, enforce the payload ceiling and send
    pub fn send_message(&mut self, message: &ExternalMessage) -> Result<()> {
        let frame = serialize_external_message(message)?;
        if let Err(e) = check_payload_size(&frame, self.protocol.max_payload_size) {
            self.stats.send_failures += 1;
            tracing::warn!("Not sending {}: {}", message.message_type, e);
            return Err(e.into());
        }
        if !self.transport.is_connected() {
            self.stats.send_failures += 1;
            return Err(TransportError::NotConnected.into());
        }
        if let Err(e) = self.transport.send_frame(&frame) {
            self.stats.send_failures += 1;
            tracing::error!("Failed to send {}: {}", message.message_type, e);
            return Err(e.into());
        }

        self.stats.frames_sent += 1;
        tracing::debug!(
            "Sent {}: {}",
            message.message_type,
            truncate_for_log(&frame, self.protocol.log_truncate_length)
        );
        Ok(())
    }

    /// Send every request the tracker dispatched
    ///
    /// A request that cannot be sent is failed at once, which frees its slot
    /// and may dispatch the next queued request into this same loop.
    fn flush_outbound(&mut self) {
        while let Ok(message) = self.outbound_rx.try_recv() {
            if let Err(e) = self.send_message(&message) {
                tracing::error!("Dropped outbound request {}: {}", message.request_id, e);
                self.requests
                    .fail(&message.request_id, RequestError::DispatchFailed(e.to_string()));
            }
        }
    }

    // === Lifecycle and accessors ===

    /// Fail every pending request
    pub fn shutdown(&mut self) {
        self.requests.shutdown();
    }

    /// Whether the peer has sent anything within the activity timeout
    pub fn is_peer_active(&self) -> bool {
        self.last_activity_ms.is_some_and(|last| {
            self.clock.now_ms().saturating_sub(last) < self.protocol.activity_timeout_ms
        })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn audio(&self) -> &SharedAudioManager {
        &self.audio
    }

    pub fn requests(&self) -> &RequestTracker<ChannelDispatcher> {
        &self.requests
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::manager::AudioStateManager;
    use crate::audio::state::TabState;
    use crate::clock::ManualClock;
    use crate::error::Error;
    use crate::transport::MemoryTransport;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::sync::Arc;

    const ME: &str = "ESP32S3-CONTROL-CENTER";

    struct Harness {
        bridge: MessageBridge<MemoryTransport>,
        transport: MemoryTransport,
        clock: ManualClock,
    }

    fn harness() -> Harness {
        let config = AppConfig::default();
        let clock = ManualClock::new(1_000);
        let shared: SharedClock = Arc::new(clock.clone());
        let audio = AudioStateManager::new(&config.audio, shared.clone()).into_shared();
        let transport = MemoryTransport::new();
        let bridge = MessageBridge::new(&config, audio, transport.clone(), shared);
        Harness {
            bridge,
            transport,
            clock,
        }
    }

    fn status_frame(device_id: &str, sessions: Value) -> String {
        json!({
            "messageType": 0,
            "requestId": "host-1",
            "deviceId": device_id,
            "timestamp": 5,
            "sessions": sessions,
            "defaultDevice": {
                "friendlyName": "Speakers",
                "volume": 50.0,
                "isMuted": false,
                "dataFlow": "Render",
                "deviceRole": "Console"
            }
        })
        .to_string()
    }

    fn sent(transport: &MemoryTransport) -> Vec<Value> {
        transport
            .take_frames()
            .iter()
            .map(|f| serde_json::from_str(f).unwrap())
            .collect()
    }

    #[test]
    fn test_status_update_reaches_audio_state() {
        let mut h = harness();
        let frame = status_frame(
            "host",
            json!([
                {"processId": 1, "processName": "spotify.exe", "displayName": "Spotify", "volume": 70.0, "isMuted": false, "state": "Active"}
            ]),
        );
        h.bridge.handle_frame(&frame).unwrap();

        let audio = h.bridge.audio().lock();
        let state = audio.state();
        assert_eq!(state.device_count(), 1);
        assert_eq!(state.device("spotify.exe").unwrap().volume, 70.0);
        assert_eq!(state.current_tab(), TabState::Master);
        assert!(state.has_valid_selection());
        drop(audio);

        assert_eq!(h.bridge.stats().status_updates_applied, 1);
        assert!(h.bridge.is_peer_active());
    }

    #[test]
    fn test_status_update_with_null_fields_still_applied() {
        let mut h = harness();
        let frame = status_frame(
            "host",
            json!([
                {"processId": 4, "processName": "chrome.exe", "displayName": null, "volume": 55.0, "isMuted": false, "state": null}
            ]),
        );
        h.bridge.handle_frame(&frame).unwrap();

        let audio = h.bridge.audio().lock();
        assert_eq!(audio.state().device_count(), 1);
        assert_eq!(audio.state().device("chrome.exe").unwrap().volume, 55.0);
    }

    #[test]
    fn test_loopback_frame_ignored() {
        let mut h = harness();
        let frame = status_frame(
            ME,
            json!([{"processName": "a.exe", "volume": 10.0}]),
        );
        h.bridge.handle_frame(&frame).unwrap();

        assert_eq!(h.bridge.stats().frames_ignored, 1);
        assert!(!h.bridge.audio().lock().state().has_devices());
    }

    #[test]
    fn test_malformed_and_oversized_frames_rejected() {
        let mut h = harness();
        assert!(h.bridge.handle_frame("").is_err());
        assert!(h.bridge.handle_frame("{not json").is_err());
        assert!(h.bridge.handle_frame(r#"{"messageType": 99}"#).is_err());

        let huge = format!(r#"{{"messageType":0,"pad":"{}"}}"#, "x".repeat(3000));
        assert!(matches!(
            h.bridge.handle_frame(&huge),
            Err(Error::Protocol(ProtocolError::PayloadTooLarge { .. }))
        ));

        assert_eq!(h.bridge.stats().frames_rejected, 4);
        assert!(!h.bridge.is_peer_active());
    }

    #[test]
    fn test_get_status_answered() {
        let mut h = harness();
        h.bridge
            .handle_frame(&status_frame(
                "host",
                json!([{"processName": "a.exe", "volume": 30.0}]),
            ))
            .unwrap();

        let request = json!({"messageType": 2, "requestId": "ask-1", "deviceId": "host", "timestamp": 9});
        h.bridge.handle_frame(&request.to_string()).unwrap();

        let frames = sent(&h.transport);
        assert_eq!(frames.len(), 1);
        let reply = &frames[0];
        assert_eq!(reply["messageType"], json!(1));
        assert_eq!(reply["deviceId"], json!(ME));
        assert_eq!(reply["reason"], json!("StatusRequest"));
        assert_eq!(reply["originatingRequestId"], json!("ask-1"));
        assert_eq!(reply["sessions"][0]["processName"], json!("a.exe"));
        assert_eq!(h.bridge.stats().status_requests_answered, 1);
    }

    #[test]
    fn test_publish_status_update() {
        let mut h = harness();
        h.bridge.publish_status_update().unwrap();

        let frames = sent(&h.transport);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["messageType"], json!(1));
        assert_eq!(frames[0]["reason"], json!("UpdateResponse"));
        assert_eq!(frames[0]["activeSessionCount"], json!(0));
    }

    #[test]
    fn test_publish_fails_when_disconnected() {
        let mut h = harness();
        h.transport.set_connected(false);
        assert!(matches!(
            h.bridge.publish_status_update(),
            Err(Error::Transport(TransportError::NotConnected))
        ));
        assert_eq!(h.bridge.stats().send_failures, 1);
    }

    #[test]
    fn test_asset_request_round_trip() {
        let mut h = harness();
        let results = Arc::new(Mutex::new(Vec::new()));
        let sink = results.clone();
        let request_id = h
            .bridge
            .request_asset("discord.exe", move |r| sink.lock().push(r));

        let frames = sent(&h.transport);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["messageType"], json!(3));
        assert_eq!(frames[0]["processName"], json!("discord.exe"));
        assert_eq!(frames[0]["requestId"], json!(request_id));

        let reply = json!({
            "messageType": 4,
            "requestId": request_id,
            "deviceId": "host",
            "timestamp": 20,
            "processName": "discord.exe",
            "success": true,
            "assetData": "aGVsbG8=",
            "metadata": {"width": 16, "height": 16, "format": "png"}
        });
        h.bridge.handle_frame(&reply.to_string()).unwrap();

        let results = results.lock();
        assert_eq!(results.len(), 1);
        let asset = results[0].as_ref().unwrap();
        assert_eq!(asset.decode_asset().unwrap(), b"hello".to_vec());
        assert_eq!(h.bridge.requests().stats().completed, 1);
    }

    #[test]
    fn test_unsendable_request_fails_and_frees_slot() {
        let mut h = harness();
        let results = Arc::new(Mutex::new(Vec::new()));

        h.transport.set_connected(false);
        let sink = results.clone();
        h.bridge
            .request_asset("a.exe", move |r| sink.lock().push(r));

        assert_eq!(results.lock().len(), 1);
        assert!(matches!(
            results.lock()[0],
            Err(RequestError::DispatchFailed(_))
        ));
        assert_eq!(h.bridge.requests().in_flight_count(), 0);
        assert_eq!(h.bridge.requests().stats().failed, 1);

        h.transport.set_connected(true);
        let second = h.bridge.request_asset("b.exe", |_| {});
        let frames = sent(&h.transport);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["requestId"], json!(second));
        assert_eq!(h.bridge.requests().in_flight_count(), 1);
        assert_eq!(h.bridge.requests().queued_count(), 0);
    }

    #[test]
    fn test_queued_request_sent_after_completion() {
        let mut h = harness();
        let first = h.bridge.request_asset("a.exe", |_| {});
        let second = h.bridge.request_asset("b.exe", |_| {});
        assert_eq!(sent(&h.transport).len(), 1);
        assert_eq!(h.bridge.requests().queued_count(), 1);

        let reply = json!({"messageType": 4, "requestId": first, "deviceId": "host", "success": false, "errorMessage": "no icon"});
        h.bridge.handle_frame(&reply.to_string()).unwrap();

        let frames = sent(&h.transport);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["requestId"], json!(second));
    }

    #[test]
    fn test_status_request_correlated_by_originating_request_id() {
        let mut h = harness();
        let results = Arc::new(Mutex::new(Vec::new()));
        let sink = results.clone();
        let request_id = h.bridge.request_status(move |r| sink.lock().push(r));

        let frames = sent(&h.transport);
        assert_eq!(frames[0]["messageType"], json!(2));

        let reply = json!({
            "messageType": 1,
            "requestId": "host-9",
            "deviceId": "host",
            "timestamp": 30,
            "originatingRequestId": request_id,
            "reason": "StatusRequest",
            "sessions": [{"processName": "game.exe", "volume": 80.0}]
        });
        h.bridge.handle_frame(&reply.to_string()).unwrap();

        let results = results.lock();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap().sessions.len(), 1);
        assert!(h.bridge.audio().lock().state().is_device_available("game.exe"));
    }

    #[test]
    fn test_tick_times_out_requests() {
        let mut h = harness();
        let results = Arc::new(Mutex::new(Vec::new()));
        let sink = results.clone();
        h.bridge.request_status(move |r| sink.lock().push(r));

        h.clock.advance(29_999);
        assert_eq!(h.bridge.tick(), 0);
        h.clock.advance(1);
        assert_eq!(h.bridge.tick(), 1);

        assert!(matches!(
            results.lock()[0],
            Err(RequestError::TimedOut { .. })
        ));
    }

    #[test]
    fn test_peer_activity_expires() {
        let mut h = harness();
        h.bridge
            .handle_frame(&status_frame("host", json!([])))
            .unwrap();
        assert!(h.bridge.is_peer_active());

        h.clock.advance(30_000);
        assert!(!h.bridge.is_peer_active());
    }

    #[test]
    fn test_shutdown_fails_pending() {
        let mut h = harness();
        let results = Arc::new(Mutex::new(Vec::new()));
        let sink = results.clone();
        h.bridge.request_asset("a.exe", move |r| sink.lock().push(r));
        h.bridge.shutdown();

        assert_eq!(*results.lock(), vec![Err(RequestError::ShuttingDown)]);
    }
}
