//! # Mixer Link
//!
//! Core of a hardware audio-mixer remote: talks JSON to a companion host
//! that owns the system's audio sessions, keeps a local model of those
//! sessions, and feeds display updates to a render loop.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          COMPANION HOST                              │
//! │        STATUS_UPDATE / STATUS_MESSAGE / ASSET_RESPONSE / GET_STATUS  │
//! └───────────────────────────────┬──────────────────────────────────────┘
//!                                 │ JSON text frames (transport)
//!                                 ▼
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                     NETWORK CONTEXT (bridge)                         │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────────────┐  │
//! │  │ protocol::   │──▶│ router::     │──▶│ internal messages        │  │
//! │  │ codec        │   │ ignore filter│   │ (AudioStateUpdate, ...)  │  │
//! │  └──────────────┘   └──────────────┘   └────────────┬─────────────┘  │
//! │         ▲                                           │                │
//! │         │ GET_ASSETS / GET_STATUS                    │                │
//! │  ┌──────┴───────────────┐                           │                │
//! │  │ requests::tracker    │◀── replies by requestId ──┤                │
//! │  │ (in flight + FIFO)   │                           │                │
//! │  └──────────────────────┘                           ▼                │
//! │                          ┌───────────────────────────────────────┐   │
//! │                          │ audio::manager (Arc<Mutex<..>>)       │   │
//! │                          │  AudioAppState, selections, tabs      │   │
//! │                          └──────────────────┬────────────────────┘   │
//! │                                             │ change events          │
//! │                                             ▼                        │
//! │                          ┌───────────────────────────────────────┐   │
//! │                          │ ui::audio_view ─▶ ui::queue           │   │
//! │                          │ (lock-free, bounded, drop-newest)     │   │
//! │                          └──────────────────┬────────────────────┘   │
//! └─────────────────────────────────────────────┼────────────────────────┘
//!                                               ▼
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                   RENDER CONTEXT (ui::render)                        │
//! │        RenderLoop: ≤ max_per_cycle updates per tick ─▶ UiSink        │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod bridge;
pub mod clock;
pub mod config;
pub mod error;
pub mod protocol;
pub mod requests;
pub mod router;
pub mod transport;
pub mod ui;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Device identity used for loopback filtering
    pub const DEVICE_ID: &str = "ESP32S3-CONTROL-CENTER";

    pub const DEVICE_TYPE: &str = "ESP32S3";

    /// Maximum serialized frame size in bytes
    pub const MAX_PAYLOAD_SIZE: usize = 2048;

    /// Characters of a frame kept in log lines
    pub const LOG_TRUNCATE_LENGTH: usize = 1000;

    /// Peer considered idle after this long without a frame
    pub const ACTIVITY_TIMEOUT_MS: u64 = 30_000;

    /// Further snapshots a missing session survives once stale
    pub const STALE_GRACE_SNAPSHOTS: u32 = 2;

    /// Default pending-request timeout
    pub const REQUEST_TIMEOUT_MS: u64 = 30_000;

    pub const MAX_CONCURRENT_REQUESTS: usize = 1;

    pub const MAX_QUEUED_REQUESTS: usize = 16;

    /// Outbound request messages awaiting the transport
    pub const OUTBOUND_QUEUE_CAPACITY: usize = 16;

    /// UI update queue capacity
    pub const UI_QUEUE_CAPACITY: usize = 32;

    /// Updates applied per render tick
    pub const UI_MAX_UPDATES_PER_CYCLE: usize = 20;

    /// Render loop cadence
    pub const UI_TICK_INTERVAL_MS: u64 = 10;
}
