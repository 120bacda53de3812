//! Error types for the mixer link core

use thiserror::Error;

use crate::audio::state::TabState;
use crate::protocol::types::ExternalMessageType;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Request error: {0}")]
    Request(#[from] RequestError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config write error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wire protocol errors (parsing, validation, serialization)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Empty JSON payload")]
    EmptyPayload,

    #[error("JSON deserialization failed: {0}")]
    DeserializationFailed(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid messageType value: {0}")]
    InvalidType(String),

    #[error("Expected {expected:?} message, got {actual:?}")]
    WrongMessageType {
        expected: &'static [ExternalMessageType],
        actual: ExternalMessageType,
    },

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

/// Audio state mutation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("No device selected in {0:?} tab")]
    NoSelection(TabState),

    #[error("No default device available")]
    NoDefaultDevice,

    #[error("Operation requires {expected:?} tab, current tab is {actual:?}")]
    WrongTab { expected: TabState, actual: TabState },
}

/// Pending request failures delivered to request callbacks
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    #[error("Request timed out: {request_id}")]
    TimedOut { request_id: String },

    #[error("Failed to dispatch request: {0}")]
    DispatchFailed(String),

    #[error("Request rejected by peer: {0}")]
    Rejected(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Service shutting down")]
    ShuttingDown,
}

/// Transport errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Transport not connected")]
    NotConnected,

    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
