//! Strongly typed payloads carried by external messages
//!
//! These mirror the companion host's status and asset structures. Field
//! names on the wire are camelCase.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtocolError;
use crate::protocol::external::ExternalMessage;
use crate::protocol::types::fields;

/// Largest decoded asset accepted from the peer
pub const MAX_ASSET_SIZE: usize = 100_000;

/// Lifecycle state of an audio session as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SessionState {
    #[default]
    Active,
    Inactive,
    Expired,
}

impl From<String> for SessionState {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "" | "active" => SessionState::Active,
            "expired" => SessionState::Expired,
            _ => SessionState::Inactive,
        }
    }
}

impl From<SessionState> for String {
    fn from(value: SessionState) -> Self {
        match value {
            SessionState::Active => "Active",
            SessionState::Inactive => "Inactive",
            SessionState::Expired => "Expired",
        }
        .to_string()
    }
}

/// Endpoint data flow direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DataFlow {
    #[default]
    Render,
    Capture,
}

impl From<String> for DataFlow {
    fn from(value: String) -> Self {
        if value.eq_ignore_ascii_case("capture") {
            DataFlow::Capture
        } else {
            DataFlow::Render
        }
    }
}

impl From<DataFlow> for String {
    fn from(value: DataFlow) -> Self {
        match value {
            DataFlow::Render => "Render",
            DataFlow::Capture => "Capture",
        }
        .to_string()
    }
}

/// Endpoint role the default device is registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeviceRole {
    #[default]
    Console,
    Multimedia,
    Communications,
}

impl From<String> for DeviceRole {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "multimedia" => DeviceRole::Multimedia,
            "communications" => DeviceRole::Communications,
            _ => DeviceRole::Console,
        }
    }
}

impl From<DeviceRole> for String {
    fn from(value: DeviceRole) -> Self {
        match value {
            DeviceRole::Console => "Console",
            DeviceRole::Multimedia => "Multimedia",
            DeviceRole::Communications => "Communications",
        }
        .to_string()
    }
}

/// One audio session in a status snapshot
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionStatus {
    pub process_id: i64,
    pub process_name: String,
    pub display_name: String,
    /// Volume in percent, fractional values preserved
    pub volume: f32,
    pub is_muted: bool,
    pub state: SessionState,
}

fn str_field(object: &Map<String, Value>, key: &str) -> String {
    object
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn f32_field(object: &Map<String, Value>, key: &str) -> f32 {
    object.get(key).and_then(Value::as_f64).unwrap_or(0.0) as f32
}

fn bool_field(object: &Map<String, Value>, key: &str) -> bool {
    object.get(key).and_then(Value::as_bool).unwrap_or(false)
}

impl SessionStatus {
    pub fn new(process_name: impl Into<String>, volume: f32, is_muted: bool) -> Self {
        let process_name = process_name.into();
        Self {
            display_name: process_name.clone(),
            process_name,
            volume,
            is_muted,
            ..Default::default()
        }
    }

    /// Build from one entry of a `sessions` array
    ///
    /// Null or mistyped fields take their defaults. Returns `None` when the
    /// entry is not an object.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        Some(Self {
            process_id: object
                .get(fields::PROCESS_ID)
                .and_then(Value::as_i64)
                .unwrap_or(0),
            process_name: str_field(object, fields::PROCESS_NAME),
            display_name: str_field(object, fields::DISPLAY_NAME),
            volume: f32_field(object, fields::VOLUME),
            is_muted: bool_field(object, fields::IS_MUTED),
            state: SessionState::from(str_field(object, fields::STATE)),
        })
    }
}

/// The host's default audio endpoint
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DefaultDeviceStatus {
    pub friendly_name: String,
    pub volume: f32,
    pub is_muted: bool,
    pub data_flow: DataFlow,
    pub device_role: DeviceRole,
}

impl DefaultDeviceStatus {
    /// Build from a `defaultDevice` object, defaulting null or mistyped fields
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        Some(Self {
            friendly_name: str_field(object, fields::FRIENDLY_NAME),
            volume: f32_field(object, fields::VOLUME),
            is_muted: bool_field(object, fields::IS_MUTED),
            data_flow: DataFlow::from(str_field(object, fields::DATA_FLOW)),
            device_role: DeviceRole::from(str_field(object, fields::DEVICE_ROLE)),
        })
    }
}

/// A full status snapshot from the host
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AudioStatusData {
    pub sessions: Vec<SessionStatus>,
    pub default_device: Option<DefaultDeviceStatus>,
    pub timestamp: u64,
    pub reason: String,
    pub originating_device_id: String,
    pub originating_request_id: String,
    pub active_session_count: u32,
}

impl AudioStatusData {
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty() && self.default_device.is_none()
    }
}

/// A logo/asset reply correlated to a GET_ASSETS request
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AssetResponseData {
    pub request_id: String,
    pub device_id: String,
    pub timestamp: u64,
    pub process_name: String,
    pub success: bool,
    pub error_message: String,
    pub asset_data_base64: String,
    pub width: u32,
    pub height: u32,
    pub format: String,
}

impl AssetResponseData {
    /// Build from a message, defaulting every absent or mistyped field
    pub fn from_message(message: &ExternalMessage) -> Self {
        let mut data = Self {
            request_id: message.request_id.clone(),
            device_id: message.device_id.clone(),
            timestamp: message.timestamp,
            process_name: message.get_str(fields::PROCESS_NAME).unwrap_or_default().to_string(),
            success: message.get_bool(fields::SUCCESS).unwrap_or(false),
            error_message: message.get_str(fields::ERROR_MESSAGE).unwrap_or_default().to_string(),
            asset_data_base64: message.get_str(fields::ASSET_DATA).unwrap_or_default().to_string(),
            ..Default::default()
        };

        if let Some(metadata) = message.get(fields::METADATA).and_then(|v| v.as_object()) {
            let dimension = |key: &str| {
                metadata
                    .get(key)
                    .and_then(|v| v.as_u64())
                    .and_then(|v| u32::try_from(v).ok())
                    .unwrap_or(0)
            };
            data.width = dimension(fields::WIDTH);
            data.height = dimension(fields::HEIGHT);
            data.format = metadata
                .get(fields::FORMAT)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
        }

        data
    }

    pub fn has_asset_data(&self) -> bool {
        !self.asset_data_base64.is_empty()
    }

    /// Decode the base64 image payload
    pub fn decode_asset(&self) -> Result<Vec<u8>, ProtocolError> {
        // Upper bound of the decoded size, checked before allocating
        let estimated = self.asset_data_base64.len() / 4 * 3;
        if estimated > MAX_ASSET_SIZE + 3 {
            return Err(ProtocolError::PayloadTooLarge {
                size: estimated,
                max: MAX_ASSET_SIZE,
            });
        }

        let bytes = BASE64
            .decode(self.asset_data_base64.as_bytes())
            .map_err(|e| ProtocolError::DeserializationFailed(e.to_string()))?;

        if bytes.len() > MAX_ASSET_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: bytes.len(),
                max: MAX_ASSET_SIZE,
            });
        }
        Ok(bytes)
    }
}
