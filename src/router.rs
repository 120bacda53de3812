//! Conversion between external and internal message domains
//!
//! Pure mapping layer: no I/O, no state.

use crate::protocol::codec::{create_status_response, parse_asset_response, parse_audio_status};
use crate::protocol::external::{generate_request_id, ExternalMessage};
use crate::protocol::internal::{InternalMessage, InternalPayload};
use crate::protocol::types::ExternalMessageType;

/// Whether an inbound message must be dropped before touching any state
///
/// Drops invalid or unvalidated messages and loopback traffic, including
/// traffic relayed back to us by another device.
pub fn should_ignore_message(message: &ExternalMessage, my_device_id: &str) -> bool {
    if message.message_type == ExternalMessageType::Invalid {
        return true;
    }
    if !message.validated {
        tracing::warn!(
            "Ignoring unvalidated {} message from {}",
            message.message_type,
            message.device_id
        );
        return true;
    }
    if message.is_self_originated(my_device_id) {
        tracing::debug!(
            "Ignoring self-originated {} message (requestId={})",
            message.message_type,
            message.request_id
        );
        return true;
    }
    false
}

/// Map an inbound external message to zero or more internal messages
///
/// Parse failures yield an empty list; the error is logged here and not
/// propagated.
pub fn external_to_internal(message: &ExternalMessage) -> Vec<InternalMessage> {
    match message.message_type {
        ExternalMessageType::StatusUpdate | ExternalMessageType::StatusMessage => {
            match parse_audio_status(message) {
                Ok(status) => vec![InternalMessage::audio_state_update(status, message.timestamp)],
                Err(e) => {
                    tracing::warn!("Dropping malformed {}: {}", message.message_type, e);
                    Vec::new()
                }
            }
        }
        ExternalMessageType::AssetResponse => match parse_asset_response(message) {
            Ok(asset) => vec![InternalMessage::asset_response(asset, message.timestamp)],
            Err(e) => {
                tracing::warn!("Dropping malformed asset response: {}", e);
                Vec::new()
            }
        },
        _ => Vec::new(),
    }
}

/// Map an internal message to its external form
///
/// Only audio state updates have an external form (STATUS_MESSAGE). Every
/// other internal message maps to an `Invalid` message that the caller must
/// discard.
pub fn internal_to_external(internal: &InternalMessage, device_id: &str) -> ExternalMessage {
    match &internal.payload {
        InternalPayload::AudioStateUpdate(status) => {
            match create_status_response(status, device_id, &generate_request_id()) {
                Ok(mut message) => {
                    message.timestamp = internal.timestamp;
                    message
                }
                Err(e) => {
                    tracing::warn!("Failed to convert audio state update: {}", e);
                    invalid(device_id, internal.timestamp)
                }
            }
        }
        _ => invalid(device_id, internal.timestamp),
    }
}

fn invalid(device_id: &str, timestamp: u64) -> ExternalMessage {
    ExternalMessage::new(ExternalMessageType::Invalid, "", device_id, timestamp)
}
