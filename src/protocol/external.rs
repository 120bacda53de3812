//! Cross-device message envelope

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::protocol::types::{fields, ExternalMessageType, MessagePriority};

/// A message exchanged with the companion host
///
/// The envelope fields are held as typed members; everything else the peer
/// sent lives in `payload`, interpreted per message type.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalMessage {
    pub message_type: ExternalMessageType,
    pub request_id: String,
    pub device_id: String,
    /// Original sender when the message was relayed; empty if not relayed
    pub originating_device_id: String,
    /// Milliseconds, sender's clock (or ours when the sender omitted it)
    pub timestamp: u64,
    /// Set only by the codec after a successful parse
    pub validated: bool,
    pub payload: Map<String, Value>,
}

impl ExternalMessage {
    pub fn new(
        message_type: ExternalMessageType,
        request_id: impl Into<String>,
        device_id: impl Into<String>,
        timestamp: u64,
    ) -> Self {
        Self {
            message_type,
            request_id: request_id.into(),
            device_id: device_id.into(),
            originating_device_id: String::new(),
            timestamp,
            validated: false,
            payload: Map::new(),
        }
    }

    /// Whether this message came from (or was relayed on behalf of) `my_device_id`
    pub fn is_self_originated(&self, my_device_id: &str) -> bool {
        self.device_id == my_device_id
            || (!self.originating_device_id.is_empty() && self.originating_device_id == my_device_id)
    }

    pub fn requires_response(&self) -> bool {
        self.message_type.requires_response()
    }

    pub fn priority(&self) -> MessagePriority {
        self.message_type.priority()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.payload.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.payload.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.payload.get(field).and_then(Value::as_str)
    }

    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.payload.get(field).and_then(Value::as_bool)
    }

    pub fn get_u64(&self, field: &str) -> Option<u64> {
        self.payload.get(field).and_then(Value::as_u64)
    }

    /// Insert a payload field. Envelope field names are ignored.
    pub fn set(&mut self, field: &str, value: Value) {
        if fields::CORE.contains(&field) {
            tracing::warn!("Refusing to shadow envelope field '{}' in payload", field);
            return;
        }
        self.payload.insert(field.to_string(), value);
    }

    pub fn with_field(mut self, field: &str, value: Value) -> Self {
        self.set(field, value);
        self
    }
}

/// Generate a fresh request correlation id
pub fn generate_request_id() -> String {
    format!("esp32_{}", Uuid::new_v4().simple())
}

/// Constructors for the outbound messages this device originates
pub struct MessageFactory;

impl MessageFactory {
    /// GET_STATUS asking the host for a full snapshot
    pub fn status_request(device_id: &str, timestamp: u64) -> ExternalMessage {
        ExternalMessage::new(
            ExternalMessageType::GetStatus,
            generate_request_id(),
            device_id,
            timestamp,
        )
    }

    /// GET_ASSETS asking the host for the logo of `process_name`
    pub fn asset_request(
        request_id: &str,
        process_name: &str,
        device_id: &str,
        timestamp: u64,
    ) -> ExternalMessage {
        ExternalMessage::new(
            ExternalMessageType::GetAssets,
            request_id,
            device_id,
            timestamp,
        )
        .with_field(fields::PROCESS_NAME, Value::from(process_name))
    }
}
