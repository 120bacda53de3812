//! Audio mixer state subsystem

pub mod events;
pub mod manager;
pub mod state;

pub use events::{
    AudioCommand, AudioStateChangeEvent, AudioSubscriber, DeviceTarget, Notification,
    SubscriptionId,
};
pub use manager::{clamp_volume, AudioStateManager, SharedAudioManager};
pub use state::{AudioAppState, AudioLevel, DefaultDevice, TabState};
