//! Intra-device messages
//!
//! Each variant carries its own typed payload; the payload is decoded once at
//! the external boundary and never reinterpreted from raw bytes.

use crate::protocol::data::{AssetResponseData, AudioStatusData};
use crate::protocol::types::{InternalMessageType, MessagePriority};

/// Payload of an internal message, keyed by its type
#[derive(Debug, Clone, PartialEq)]
pub enum InternalPayload {
    WifiStatus { status: String, connected: bool },
    NetworkInfo { ssid: String, ip: String },
    UiUpdate { component: String, data: String },
    SdStatus { status: String, mounted: bool },
    AssetResponse(AssetResponseData),
    AudioStateUpdate(AudioStatusData),
    AudioUiRefresh,
    AudioDeviceChange { device_name: String },
    SystemStatus { status: String },
    DebugLog { message: String },
    CoreSync { from_core: u8, to_core: u8 },
}

impl InternalPayload {
    pub fn message_type(&self) -> InternalMessageType {
        match self {
            InternalPayload::WifiStatus { .. } => InternalMessageType::WifiStatus,
            InternalPayload::NetworkInfo { .. } => InternalMessageType::NetworkInfo,
            InternalPayload::UiUpdate { .. } => InternalMessageType::UiUpdate,
            InternalPayload::SdStatus { .. } => InternalMessageType::SdStatus,
            InternalPayload::AssetResponse(_) => InternalMessageType::AssetResponse,
            InternalPayload::AudioStateUpdate(_) => InternalMessageType::AudioStateUpdate,
            InternalPayload::AudioUiRefresh => InternalMessageType::AudioUiRefresh,
            InternalPayload::AudioDeviceChange { .. } => InternalMessageType::AudioDeviceChange,
            InternalPayload::SystemStatus { .. } => InternalMessageType::SystemStatus,
            InternalPayload::DebugLog { .. } => InternalMessageType::DebugLog,
            InternalPayload::CoreSync { .. } => InternalMessageType::CoreSync,
        }
    }
}

/// A timestamped internal message
#[derive(Debug, Clone, PartialEq)]
pub struct InternalMessage {
    pub payload: InternalPayload,
    pub timestamp: u64,
}

impl InternalMessage {
    pub fn new(payload: InternalPayload, timestamp: u64) -> Self {
        Self { payload, timestamp }
    }

    pub fn message_type(&self) -> InternalMessageType {
        self.payload.message_type()
    }

    pub fn priority(&self) -> MessagePriority {
        self.message_type().priority()
    }

    pub fn audio_state_update(data: AudioStatusData, timestamp: u64) -> Self {
        Self::new(InternalPayload::AudioStateUpdate(data), timestamp)
    }

    pub fn asset_response(data: AssetResponseData, timestamp: u64) -> Self {
        Self::new(InternalPayload::AssetResponse(data), timestamp)
    }

    pub fn wifi_status(status: impl Into<String>, connected: bool, timestamp: u64) -> Self {
        Self::new(
            InternalPayload::WifiStatus {
                status: status.into(),
                connected,
            },
            timestamp,
        )
    }

    pub fn network_info(ssid: impl Into<String>, ip: impl Into<String>, timestamp: u64) -> Self {
        Self::new(
            InternalPayload::NetworkInfo {
                ssid: ssid.into(),
                ip: ip.into(),
            },
            timestamp,
        )
    }

    pub fn ui_update(component: impl Into<String>, data: impl Into<String>, timestamp: u64) -> Self {
        Self::new(
            InternalPayload::UiUpdate {
                component: component.into(),
                data: data.into(),
            },
            timestamp,
        )
    }

    pub fn sd_status(status: impl Into<String>, mounted: bool, timestamp: u64) -> Self {
        Self::new(
            InternalPayload::SdStatus {
                status: status.into(),
                mounted,
            },
            timestamp,
        )
    }

    pub fn audio_device_change(device_name: impl Into<String>, timestamp: u64) -> Self {
        Self::new(
            InternalPayload::AudioDeviceChange {
                device_name: device_name.into(),
            },
            timestamp,
        )
    }

    pub fn system_status(status: impl Into<String>, timestamp: u64) -> Self {
        Self::new(
            InternalPayload::SystemStatus {
                status: status.into(),
            },
            timestamp,
        )
    }

    pub fn debug_log(message: impl Into<String>, timestamp: u64) -> Self {
        Self::new(
            InternalPayload::DebugLog {
                message: message.into(),
            },
            timestamp,
        )
    }

    pub fn core_sync(from_core: u8, to_core: u8, timestamp: u64) -> Self {
        Self::new(InternalPayload::CoreSync { from_core, to_core }, timestamp)
    }
}
