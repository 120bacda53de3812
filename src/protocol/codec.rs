//! JSON codec for external messages
//!
//! Every failure here is non-fatal: callers log the error and drop the frame.

use serde_json::{Map, Value};

use crate::clock::Clock;
use crate::error::ProtocolError;
use crate::protocol::data::{
    AssetResponseData, AudioStatusData, DefaultDeviceStatus, SessionStatus,
};
use crate::protocol::external::ExternalMessage;
use crate::protocol::types::{fields, ExternalMessageType};

const STATUS_TYPES: &[ExternalMessageType] = &[
    ExternalMessageType::StatusUpdate,
    ExternalMessageType::StatusMessage,
];
const ASSET_TYPES: &[ExternalMessageType] = &[ExternalMessageType::AssetResponse];

fn parse_object(text: &str) -> Result<Map<String, Value>, ProtocolError> {
    if text.trim().is_empty() {
        return Err(ProtocolError::EmptyPayload);
    }

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ProtocolError::DeserializationFailed(
            "expected a JSON object".to_string(),
        )),
        Err(e) => Err(ProtocolError::DeserializationFailed(e.to_string())),
    }
}

/// Resolve the `messageType` discriminator. Integer codes are canonical;
/// type names are accepted as well.
fn message_type_of(map: &Map<String, Value>) -> Result<ExternalMessageType, ProtocolError> {
    let raw = map
        .get(fields::MESSAGE_TYPE)
        .ok_or(ProtocolError::MissingField(fields::MESSAGE_TYPE))?;

    let resolved = match raw {
        Value::Number(n) => n.as_i64().and_then(ExternalMessageType::from_code),
        Value::String(s) => ExternalMessageType::ALL
            .into_iter()
            .find(|t| t.name() == s.as_str()),
        _ => None,
    };

    resolved.ok_or_else(|| ProtocolError::InvalidType(raw.to_string()))
}

/// Classify a frame without building the full message
pub fn parse_external_message_type(text: &str) -> Result<ExternalMessageType, ProtocolError> {
    let map = parse_object(text)?;
    message_type_of(&map)
}

/// Parse and validate a frame into an [`ExternalMessage`]
///
/// A missing or zero timestamp is replaced with the local clock.
pub fn parse_external_message(
    text: &str,
    clock: &dyn Clock,
) -> Result<ExternalMessage, ProtocolError> {
    let mut map = parse_object(text)?;
    let message_type = message_type_of(&map)?;

    let take_string = |map: &mut Map<String, Value>, key: &str| match map.remove(key) {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    let request_id = take_string(&mut map, fields::REQUEST_ID);
    let device_id = take_string(&mut map, fields::DEVICE_ID);
    let originating_device_id = take_string(&mut map, fields::ORIGINATING_DEVICE_ID);
    let timestamp = match map.remove(fields::TIMESTAMP).and_then(|v| v.as_u64()) {
        Some(ts) if ts != 0 => ts,
        _ => clock.now_ms(),
    };
    map.remove(fields::MESSAGE_TYPE);

    tracing::debug!(
        "Parsed external message: type={}, deviceId={}, requestId={}",
        message_type,
        device_id,
        request_id
    );

    Ok(ExternalMessage {
        message_type,
        request_id,
        device_id,
        originating_device_id,
        timestamp,
        validated: true,
        payload: map,
    })
}

/// Serialize a message to its JSON wire form
///
/// Envelope fields are emitted first, then every payload field except the
/// envelope names. The output is never truncated; enforcing the payload
/// ceiling is up to the caller.
pub fn serialize_external_message(message: &ExternalMessage) -> Result<String, ProtocolError> {
    let mut map = Map::new();
    map.insert(
        fields::MESSAGE_TYPE.to_string(),
        Value::from(message.message_type.code()),
    );
    map.insert(
        fields::REQUEST_ID.to_string(),
        Value::from(message.request_id.as_str()),
    );
    map.insert(
        fields::DEVICE_ID.to_string(),
        Value::from(message.device_id.as_str()),
    );
    map.insert(fields::TIMESTAMP.to_string(), Value::from(message.timestamp));

    if !message.originating_device_id.is_empty() {
        map.insert(
            fields::ORIGINATING_DEVICE_ID.to_string(),
            Value::from(message.originating_device_id.as_str()),
        );
    }

    for (key, value) in &message.payload {
        if !fields::CORE.contains(&key.as_str()) {
            map.insert(key.clone(), value.clone());
        }
    }

    serde_json::to_string(&Value::Object(map))
        .map_err(|e| ProtocolError::SerializationFailed(e.to_string()))
}

/// Reject frames above the protocol payload ceiling
pub fn check_payload_size(frame: &str, max: usize) -> Result<(), ProtocolError> {
    if frame.len() > max {
        return Err(ProtocolError::PayloadTooLarge {
            size: frame.len(),
            max,
        });
    }
    Ok(())
}

/// Extract the audio snapshot carried by a STATUS_UPDATE or STATUS_MESSAGE
pub fn parse_audio_status(message: &ExternalMessage) -> Result<AudioStatusData, ProtocolError> {
    if !STATUS_TYPES.contains(&message.message_type) {
        return Err(ProtocolError::WrongMessageType {
            expected: STATUS_TYPES,
            actual: message.message_type,
        });
    }

    // Entries are decoded field by field; one bad field never drops the snapshot
    let sessions = match message.get(fields::SESSIONS) {
        Some(Value::Null) | None => Vec::new(),
        Some(Value::Array(entries)) => {
            let sessions: Vec<SessionStatus> =
                entries.iter().filter_map(SessionStatus::from_value).collect();
            if sessions.len() < entries.len() {
                tracing::warn!(
                    "Skipped {} non-object session entries",
                    entries.len() - sessions.len()
                );
            }
            sessions
        }
        Some(other) => {
            return Err(ProtocolError::DeserializationFailed(format!(
                "sessions: expected an array, got {}",
                other
            )))
        }
    };

    let default_device = message
        .get(fields::DEFAULT_DEVICE)
        .and_then(DefaultDeviceStatus::from_value);

    let active_session_count = message
        .get_u64(fields::ACTIVE_SESSION_COUNT)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(sessions.len() as u32);

    Ok(AudioStatusData {
        sessions,
        default_device,
        timestamp: message.timestamp,
        reason: message.get_str(fields::REASON).unwrap_or_default().to_string(),
        originating_device_id: message.originating_device_id.clone(),
        originating_request_id: message
            .get_str(fields::ORIGINATING_REQUEST_ID)
            .unwrap_or_default()
            .to_string(),
        active_session_count,
    })
}

/// Extract the asset reply carried by an ASSET_RESPONSE
pub fn parse_asset_response(
    message: &ExternalMessage,
) -> Result<AssetResponseData, ProtocolError> {
    if message.message_type != ExternalMessageType::AssetResponse {
        return Err(ProtocolError::WrongMessageType {
            expected: ASSET_TYPES,
            actual: message.message_type,
        });
    }
    Ok(AssetResponseData::from_message(message))
}

/// Build the STATUS_MESSAGE describing our local view of the mixer
pub fn create_status_response(
    data: &AudioStatusData,
    device_id: &str,
    request_id: &str,
) -> Result<ExternalMessage, ProtocolError> {
    let mut message = ExternalMessage::new(
        ExternalMessageType::StatusMessage,
        request_id,
        device_id,
        data.timestamp,
    );
    message.originating_device_id = data.originating_device_id.clone();

    let sessions = serde_json::to_value(&data.sessions)
        .map_err(|e| ProtocolError::SerializationFailed(e.to_string()))?;
    message.set(fields::SESSIONS, sessions);
    message.set(
        fields::ACTIVE_SESSION_COUNT,
        Value::from(data.active_session_count),
    );

    if let Some(default_device) = &data.default_device {
        let value = serde_json::to_value(default_device)
            .map_err(|e| ProtocolError::SerializationFailed(e.to_string()))?;
        message.set(fields::DEFAULT_DEVICE, value);
    }
    if !data.reason.is_empty() {
        message.set(fields::REASON, Value::from(data.reason.as_str()));
    }
    if !data.originating_request_id.is_empty() {
        message.set(
            fields::ORIGINATING_REQUEST_ID,
            Value::from(data.originating_request_id.as_str()),
        );
    }

    Ok(message)
}

/// Truncate a frame for logging
pub fn truncate_for_log(frame: &str, max_chars: usize) -> &str {
    match frame.char_indices().nth(max_chars) {
        Some((idx, _)) => &frame[..idx],
        None => frame,
    }
}
