//! Message type taxonomy
//!
//! External types cross the device boundary and travel as integers in the
//! `messageType` JSON field. Internal types never leave the device; their
//! codes are grouped in bands of 100 so the category can be derived from the
//! code alone.

use serde::{Deserialize, Serialize};

/// JSON field names used on the wire
pub mod fields {
    pub const MESSAGE_TYPE: &str = "messageType";
    pub const REQUEST_ID: &str = "requestId";
    pub const DEVICE_ID: &str = "deviceId";
    pub const ORIGINATING_DEVICE_ID: &str = "originatingDeviceId";
    pub const ORIGINATING_REQUEST_ID: &str = "originatingRequestId";
    pub const TIMESTAMP: &str = "timestamp";

    pub const SESSIONS: &str = "sessions";
    pub const DEFAULT_DEVICE: &str = "defaultDevice";
    pub const ACTIVE_SESSION_COUNT: &str = "activeSessionCount";
    pub const REASON: &str = "reason";

    pub const PROCESS_ID: &str = "processId";
    pub const PROCESS_NAME: &str = "processName";
    pub const DISPLAY_NAME: &str = "displayName";
    pub const VOLUME: &str = "volume";
    pub const IS_MUTED: &str = "isMuted";
    pub const STATE: &str = "state";

    pub const FRIENDLY_NAME: &str = "friendlyName";
    pub const DATA_FLOW: &str = "dataFlow";
    pub const DEVICE_ROLE: &str = "deviceRole";

    pub const SUCCESS: &str = "success";
    pub const ERROR_MESSAGE: &str = "errorMessage";
    pub const ASSET_DATA: &str = "assetData";
    pub const METADATA: &str = "metadata";
    pub const WIDTH: &str = "width";
    pub const HEIGHT: &str = "height";
    pub const FORMAT: &str = "format";

    /// Envelope fields owned by [`ExternalMessage`](crate::protocol::ExternalMessage)
    /// itself; never duplicated from the payload bag on serialization.
    pub const CORE: [&str; 5] = [
        MESSAGE_TYPE,
        REQUEST_ID,
        DEVICE_ID,
        TIMESTAMP,
        ORIGINATING_DEVICE_ID,
    ];
}

/// Reason codes carried by status messages
pub mod reasons {
    pub const UPDATE_RESPONSE: &str = "UpdateResponse";
    pub const STATUS_REQUEST: &str = "StatusRequest";
}

/// Scheduling priority, ordered so that `High > Normal > Low`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MessagePriority {
    Low = 0,
    Normal = 1,
    High = 2,
}

/// Cross-device message types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExternalMessageType {
    StatusUpdate,
    StatusMessage,
    GetStatus,
    GetAssets,
    AssetResponse,
    SessionUpdate,
    Invalid,
}

/// Coarse grouping of external message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalMessageCategory {
    Status,
    Assets,
    Session,
    Unknown,
}

impl ExternalMessageType {
    /// All valid (non-`Invalid`) types
    pub const ALL: [ExternalMessageType; 6] = [
        ExternalMessageType::StatusUpdate,
        ExternalMessageType::StatusMessage,
        ExternalMessageType::GetStatus,
        ExternalMessageType::GetAssets,
        ExternalMessageType::AssetResponse,
        ExternalMessageType::SessionUpdate,
    ];

    /// Integer code on the wire
    pub fn code(self) -> i64 {
        match self {
            ExternalMessageType::StatusUpdate => 0,
            ExternalMessageType::StatusMessage => 1,
            ExternalMessageType::GetStatus => 2,
            ExternalMessageType::GetAssets => 3,
            ExternalMessageType::AssetResponse => 4,
            ExternalMessageType::SessionUpdate => 5,
            ExternalMessageType::Invalid => -1,
        }
    }

    /// Map a wire code to a known type; `None` for anything else
    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            ExternalMessageType::StatusUpdate => "StatusUpdate",
            ExternalMessageType::StatusMessage => "StatusMessage",
            ExternalMessageType::GetStatus => "GetStatus",
            ExternalMessageType::GetAssets => "GetAssets",
            ExternalMessageType::AssetResponse => "AssetResponse",
            ExternalMessageType::SessionUpdate => "SessionUpdate",
            ExternalMessageType::Invalid => "INVALID",
        }
    }

    pub fn category(self) -> ExternalMessageCategory {
        match self {
            ExternalMessageType::StatusUpdate
            | ExternalMessageType::StatusMessage
            | ExternalMessageType::GetStatus => ExternalMessageCategory::Status,
            ExternalMessageType::GetAssets | ExternalMessageType::AssetResponse => {
                ExternalMessageCategory::Assets
            }
            ExternalMessageType::SessionUpdate => ExternalMessageCategory::Session,
            ExternalMessageType::Invalid => ExternalMessageCategory::Unknown,
        }
    }

    pub fn priority(self) -> MessagePriority {
        match self {
            // Real-time audio updates
            ExternalMessageType::StatusUpdate | ExternalMessageType::SessionUpdate => {
                MessagePriority::High
            }
            ExternalMessageType::GetAssets | ExternalMessageType::AssetResponse => {
                MessagePriority::Low
            }
            _ => MessagePriority::Normal,
        }
    }

    /// Whether a message of this type expects a correlated reply
    pub fn requires_response(self) -> bool {
        matches!(
            self,
            ExternalMessageType::GetStatus | ExternalMessageType::GetAssets
        )
    }
}

impl std::fmt::Display for ExternalMessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Intra-device message types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InternalMessageType {
    WifiStatus,
    NetworkInfo,
    UiUpdate,
    SdStatus,
    AssetResponse,
    AudioStateUpdate,
    AudioUiRefresh,
    AudioDeviceChange,
    SystemStatus,
    DebugLog,
    CoreSync,
    Invalid,
}

/// Category band of an internal message type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalMessageCategory {
    Network,
    Ui,
    Filesystem,
    Audio,
    Monitoring,
    Hardware,
    CoreComm,
    Unknown,
}

impl InternalMessageType {
    pub fn code(self) -> u16 {
        match self {
            InternalMessageType::WifiStatus => 100,
            InternalMessageType::NetworkInfo => 101,
            InternalMessageType::UiUpdate => 200,
            InternalMessageType::SdStatus => 300,
            InternalMessageType::AssetResponse => 301,
            InternalMessageType::AudioStateUpdate => 400,
            InternalMessageType::AudioUiRefresh => 401,
            InternalMessageType::AudioDeviceChange => 402,
            InternalMessageType::SystemStatus => 500,
            InternalMessageType::DebugLog => 501,
            InternalMessageType::CoreSync => 700,
            InternalMessageType::Invalid => 0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            InternalMessageType::WifiStatus => "WIFI_STATUS",
            InternalMessageType::NetworkInfo => "NETWORK_INFO",
            InternalMessageType::UiUpdate => "UI_UPDATE",
            InternalMessageType::SdStatus => "SD_STATUS",
            InternalMessageType::AssetResponse => "ASSET_RESPONSE",
            InternalMessageType::AudioStateUpdate => "AUDIO_STATE_UPDATE",
            InternalMessageType::AudioUiRefresh => "AUDIO_UI_REFRESH",
            InternalMessageType::AudioDeviceChange => "AUDIO_DEVICE_CHANGE",
            InternalMessageType::SystemStatus => "SYSTEM_STATUS",
            InternalMessageType::DebugLog => "DEBUG_LOG",
            InternalMessageType::CoreSync => "CORE_SYNC",
            InternalMessageType::Invalid => "INVALID",
        }
    }

    pub fn category(self) -> InternalMessageCategory {
        match self.code() {
            100..=199 => InternalMessageCategory::Network,
            200..=299 => InternalMessageCategory::Ui,
            300..=399 => InternalMessageCategory::Filesystem,
            400..=499 => InternalMessageCategory::Audio,
            500..=599 => InternalMessageCategory::Monitoring,
            600..=699 => InternalMessageCategory::Hardware,
            700..=799 => InternalMessageCategory::CoreComm,
            _ => InternalMessageCategory::Unknown,
        }
    }

    /// Priority used when scheduling or shedding internal traffic
    pub fn priority(self) -> MessagePriority {
        match self.category() {
            InternalMessageCategory::Ui
            | InternalMessageCategory::CoreComm
            | InternalMessageCategory::Audio => MessagePriority::High,
            InternalMessageCategory::Monitoring | InternalMessageCategory::Filesystem => {
                MessagePriority::Low
            }
            InternalMessageCategory::Network
            | InternalMessageCategory::Hardware
            | InternalMessageCategory::Unknown => MessagePriority::Normal,
        }
    }
}

impl std::fmt::Display for InternalMessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
