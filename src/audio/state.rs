//! Canonical audio mixer state
//!
//! Selections are stored as process-name keys and resolved against
//! `current_status` on every read, so removing an entry can never leave a
//! dangling selection behind.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::protocol::data::{DefaultDeviceStatus, SessionState, SessionStatus};

/// The host's default endpoint, replaced wholesale on every snapshot
pub type DefaultDevice = DefaultDeviceStatus;

/// Label shown for the default device when the host sent no friendly name
pub const DEFAULT_DEVICE_LABEL: &str = "Default Device";

/// Mixer tab currently shown on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub enum TabState {
    #[default]
    Master,
    Single,
    Balance,
}

impl TabState {
    pub fn name(self) -> &'static str {
        match self {
            TabState::Master => "Master",
            TabState::Single => "Single",
            TabState::Balance => "Balance",
        }
    }
}

/// One tracked audio session
#[derive(Debug, Clone, PartialEq)]
pub struct AudioLevel {
    pub process_id: i64,
    /// Stable key, unique across tracked sessions
    pub process_name: String,
    pub display_name: String,
    /// Percent in [0, 100]
    pub volume: f32,
    pub is_muted: bool,
    pub state: SessionState,
    /// Absent from the most recent snapshot
    pub stale: bool,
    /// Consecutive snapshots this session has been absent from
    pub missed_snapshots: u32,
    pub last_update: u64,
}

impl AudioLevel {
    pub fn from_session(session: &SessionStatus, now_ms: u64) -> Self {
        Self {
            process_id: session.process_id,
            process_name: session.process_name.clone(),
            display_name: session.display_name.clone(),
            volume: session.volume.clamp(0.0, 100.0),
            is_muted: session.is_muted,
            state: session.state,
            stale: false,
            missed_snapshots: 0,
            last_update: now_ms,
        }
    }

    /// Refresh from a snapshot entry, keeping identity
    pub fn apply_session(&mut self, session: &SessionStatus, now_ms: u64) {
        self.process_id = session.process_id;
        self.display_name = session.display_name.clone();
        self.volume = session.volume.clamp(0.0, 100.0);
        self.is_muted = session.is_muted;
        self.state = session.state;
        self.stale = false;
        self.missed_snapshots = 0;
        self.last_update = now_ms;
    }

    /// Display label, falling back to the process name
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.process_name
        } else {
            &self.display_name
        }
    }

    pub fn to_session(&self) -> SessionStatus {
        SessionStatus {
            process_id: self.process_id,
            process_name: self.process_name.clone(),
            display_name: self.display_name.clone(),
            volume: self.volume,
            is_muted: self.is_muted,
            state: self.state,
        }
    }
}

/// Application audio state
///
/// Only [`AudioStateManager`](crate::audio::AudioStateManager) mutates it;
/// everything else reads through the accessors.
#[derive(Debug, Clone, Default)]
pub struct AudioAppState {
    pub(crate) current_status: BTreeMap<String, AudioLevel>,
    pub(crate) default_device: Option<DefaultDevice>,
    pub(crate) current_tab: TabState,
    /// Master and Single tabs
    pub(crate) selected_device: Option<String>,
    /// Balance tab
    pub(crate) selected_device1: Option<String>,
    pub(crate) selected_device2: Option<String>,
    pub(crate) last_update_ms: u64,
}

impl AudioAppState {
    pub fn with_tab(tab: TabState) -> Self {
        Self {
            current_tab: tab,
            ..Default::default()
        }
    }

    /// Tracked sessions in status order (by process name)
    pub fn devices(&self) -> impl Iterator<Item = &AudioLevel> {
        self.current_status.values()
    }

    pub fn device(&self, process_name: &str) -> Option<&AudioLevel> {
        self.current_status.get(process_name)
    }

    pub fn device_names(&self) -> Vec<String> {
        self.current_status.keys().cloned().collect()
    }

    pub fn device_count(&self) -> usize {
        self.current_status.len()
    }

    pub fn has_devices(&self) -> bool {
        !self.current_status.is_empty()
    }

    pub fn is_device_available(&self, process_name: &str) -> bool {
        self.current_status.contains_key(process_name)
    }

    pub fn default_device(&self) -> Option<&DefaultDevice> {
        self.default_device.as_ref()
    }

    pub fn current_tab(&self) -> TabState {
        self.current_tab
    }

    pub fn last_update_ms(&self) -> u64 {
        self.last_update_ms
    }

    fn resolve(&self, key: &Option<String>) -> Option<&AudioLevel> {
        key.as_deref().and_then(|name| self.current_status.get(name))
    }

    /// Selection for the Master and Single tabs
    pub fn selected_device(&self) -> Option<&AudioLevel> {
        self.resolve(&self.selected_device)
    }

    /// Both Balance tab selections
    pub fn balance_devices(&self) -> (Option<&AudioLevel>, Option<&AudioLevel>) {
        (
            self.resolve(&self.selected_device1),
            self.resolve(&self.selected_device2),
        )
    }

    /// The session the current tab's controls act on
    pub fn current_device(&self) -> Option<&AudioLevel> {
        match self.current_tab {
            TabState::Master | TabState::Single => self.selected_device(),
            TabState::Balance => self.resolve(&self.selected_device1),
        }
    }

    /// Whether every selection the current tab needs resolves to a live entry
    pub fn has_valid_selection(&self) -> bool {
        match self.current_tab {
            TabState::Master | TabState::Single => self.selected_device().is_some(),
            TabState::Balance => {
                let (first, second) = self.balance_devices();
                first.is_some() && second.is_some()
            }
        }
    }

    pub fn current_device_label(&self) -> String {
        if self.current_tab == TabState::Master {
            if let Some(default_device) = &self.default_device {
                return default_device_label(default_device).to_string();
            }
        }
        self.current_device()
            .map(|d| d.label().to_string())
            .unwrap_or_default()
    }

    pub fn current_volume(&self) -> f32 {
        if self.current_tab == TabState::Master {
            if let Some(default_device) = &self.default_device {
                return default_device.volume;
            }
        }
        self.current_device().map(|d| d.volume).unwrap_or(0.0)
    }

    pub fn is_current_muted(&self) -> bool {
        if self.current_tab == TabState::Master {
            if let Some(default_device) = &self.default_device {
                return default_device.is_muted;
            }
        }
        self.current_device().map(|d| d.is_muted).unwrap_or(false)
    }

    /// Drop selection keys whose entry no longer exists
    pub(crate) fn clear_dangling_selections(&mut self) -> bool {
        let mut changed = false;
        for key in [
            &mut self.selected_device,
            &mut self.selected_device1,
            &mut self.selected_device2,
        ] {
            if let Some(name) = key.as_deref() {
                if !self.current_status.contains_key(name) {
                    tracing::info!("Clearing selection of removed device {}", name);
                    *key = None;
                    changed = true;
                }
            }
        }
        changed
    }
}

pub fn default_device_label(device: &DefaultDevice) -> &str {
    if device.friendly_name.is_empty() {
        DEFAULT_DEVICE_LABEL
    } else {
        &device.friendly_name
    }
}
