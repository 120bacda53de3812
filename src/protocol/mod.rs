//! Wire protocol: message taxonomy, envelopes, payloads and the JSON codec

pub mod codec;
pub mod data;
pub mod external;
pub mod internal;
pub mod types;

pub use codec::{
    create_status_response, parse_asset_response, parse_audio_status, parse_external_message,
    parse_external_message_type, serialize_external_message,
};
pub use data::{
    AssetResponseData, AudioStatusData, DataFlow, DefaultDeviceStatus, DeviceRole,
    SessionState, SessionStatus,
};
pub use external::{generate_request_id, ExternalMessage, MessageFactory};
pub use internal::{InternalMessage, InternalPayload};
pub use types::{
    ExternalMessageCategory, ExternalMessageType, InternalMessageCategory, InternalMessageType,
    MessagePriority,
};
