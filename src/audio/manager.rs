//! Audio state manager
//!
//! Single owner of [`AudioAppState`]. Every mutation goes through here and
//! ends with a synchronous notification of all subscribers.
//!
//! Subscribers cannot call back into the manager while it notifies them.
//! Mutations they need are queued with [`Notification::defer`] and applied
//! in order once the current round is over; such mutations notify in turn,
//! up to [`MAX_DEFERRED_ROUNDS`] rounds.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::audio::events::{
    AudioCommand, AudioStateChangeEvent, AudioSubscriber, DeviceTarget, Notification,
    SubscriptionId,
};
use crate::audio::state::{AudioAppState, AudioLevel, TabState};
use crate::clock::SharedClock;
use crate::config::AudioConfig;
use crate::error::StateError;
use crate::protocol::data::{AudioStatusData, SessionState};
use crate::protocol::types::reasons;

/// Deferred command rounds processed per top-level mutation
pub const MAX_DEFERRED_ROUNDS: usize = 8;

/// Manager handle shared between the network and rendering contexts
pub type SharedAudioManager = Arc<Mutex<AudioStateManager>>;

pub struct AudioStateManager {
    state: AudioAppState,
    subscribers: Vec<(SubscriptionId, AudioSubscriber)>,
    next_subscription: u64,
    deferred: Vec<AudioCommand>,
    draining: bool,
    stale_grace_snapshots: u32,
    clock: SharedClock,
}

impl AudioStateManager {
    pub fn new(config: &AudioConfig, clock: SharedClock) -> Self {
        Self {
            state: AudioAppState::with_tab(config.initial_tab),
            subscribers: Vec::new(),
            next_subscription: 0,
            deferred: Vec::new(),
            draining: false,
            stale_grace_snapshots: config.stale_grace_snapshots,
            clock,
        }
    }

    pub fn into_shared(self) -> SharedAudioManager {
        Arc::new(Mutex::new(self))
    }

    pub fn state(&self) -> &AudioAppState {
        &self.state
    }

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&mut Notification<'_>) + Send + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub_id, _)| *sub_id != id);
        self.subscribers.len() != before
    }

    // === Inbound snapshots ===

    /// Merge a status snapshot from the host
    ///
    /// Known sessions are updated in place, new ones are added, and missing
    /// ones go stale; a session missing from more than
    /// `stale_grace_snapshots` consecutive snapshots after going stale is
    /// purged. The default device is replaced wholesale.
    pub fn on_audio_status_received(&mut self, status: &AudioStatusData) {
        let now = self.clock.now_ms();
        tracing::debug!(
            "Merging audio status: {} sessions, default device: {}",
            status.sessions.len(),
            status.default_device.is_some()
        );

        for level in self.state.current_status.values_mut() {
            level.stale = true;
        }

        for session in &status.sessions {
            if session.process_name.is_empty() {
                tracing::warn!("Skipping session without processName");
                continue;
            }
            match self.state.current_status.get_mut(&session.process_name) {
                Some(existing) => existing.apply_session(session, now),
                None => {
                    tracing::info!("New audio session: {}", session.process_name);
                    self.state.current_status.insert(
                        session.process_name.clone(),
                        AudioLevel::from_session(session, now),
                    );
                }
            }
        }

        let grace = self.stale_grace_snapshots;
        self.state.current_status.retain(|name, level| {
            if !level.stale {
                return true;
            }
            level.missed_snapshots += 1;
            if level.missed_snapshots > grace {
                tracing::info!("Purging stale audio session: {}", name);
                false
            } else {
                true
            }
        });

        self.state.default_device = status.default_device.clone();
        self.state.last_update_ms = now;

        self.ensure_valid_selections();
        self.perform_smart_auto_selection();
        self.notify(AudioStateChangeEvent::DevicesUpdated);
    }

    /// Clear selections that no longer resolve to a tracked session
    pub fn ensure_valid_selections(&mut self) {
        self.state.clear_dangling_selections();
    }

    /// Fill empty selections for the current tab
    ///
    /// Prefers the session matching the default device when it is live and
    /// active, then the first non-stale session, then the first session.
    /// Never replaces a selection that still resolves.
    pub fn perform_smart_auto_selection(&mut self) {
        if !self.state.has_devices() {
            return;
        }

        let changed = match self.state.current_tab {
            TabState::Master | TabState::Single => {
                if self.state.selected_device().is_some() {
                    false
                } else {
                    self.state.selected_device = self.best_device(None);
                    self.state.selected_device.is_some()
                }
            }
            TabState::Balance => {
                let mut changed = false;
                if self.state.balance_devices().0.is_none() {
                    let exclude = self.state.selected_device2.clone();
                    self.state.selected_device1 = self
                        .best_device(exclude.as_deref())
                        .or_else(|| self.best_device(None));
                    changed |= self.state.selected_device1.is_some();
                }
                if self.state.balance_devices().1.is_none() {
                    let exclude = self.state.selected_device1.clone();
                    // Both sliders on one session beats an empty one
                    self.state.selected_device2 = self
                        .best_device(exclude.as_deref())
                        .or_else(|| self.best_device(None));
                    changed |= self.state.selected_device2.is_some();
                }
                changed
            }
        };

        if changed {
            let device = self.state.current_device().map(|d| d.process_name.clone());
            tracing::info!(
                "Auto-selected {:?} for {} tab",
                device,
                self.state.current_tab.name()
            );
            self.notify(AudioStateChangeEvent::SelectionChanged {
                device,
                tab: self.state.current_tab,
            });
        }
    }

    fn best_device(&self, exclude: Option<&str>) -> Option<String> {
        let candidates = || {
            self.state
                .devices()
                .filter(move |d| Some(d.process_name.as_str()) != exclude)
        };

        if let Some(default_device) = &self.state.default_device {
            let preferred = candidates().find(|d| {
                !d.stale
                    && d.state == SessionState::Active
                    && !default_device.friendly_name.is_empty()
                    && (d.process_name == default_device.friendly_name
                        || d.display_name == default_device.friendly_name)
            });
            if let Some(device) = preferred {
                return Some(device.process_name.clone());
            }
        }

        candidates()
            .find(|d| !d.stale)
            .or_else(|| candidates().next())
            .map(|d| d.process_name.clone())
    }

    // === Selection ===

    /// Select the session the current tab controls
    ///
    /// In the Balance tab this sets the first balance device.
    pub fn select_device(&mut self, process_name: &str) -> Result<(), StateError> {
        if !self.state.is_device_available(process_name) {
            tracing::warn!("Cannot select unknown device: {}", process_name);
            return Err(StateError::DeviceNotFound(process_name.to_string()));
        }

        let slot = match self.state.current_tab {
            TabState::Master | TabState::Single => &mut self.state.selected_device,
            TabState::Balance => &mut self.state.selected_device1,
        };
        let previous = slot.replace(process_name.to_string());

        tracing::info!(
            "Selected {} in {} tab",
            process_name,
            self.state.current_tab.name()
        );
        if previous.as_deref() != Some(process_name) {
            self.notify(AudioStateChangeEvent::SelectionChanged {
                device: Some(process_name.to_string()),
                tab: self.state.current_tab,
            });
        }
        Ok(())
    }

    pub fn select_balance_devices(&mut self, first: &str, second: &str) -> Result<(), StateError> {
        if self.state.current_tab != TabState::Balance {
            tracing::warn!("Balance devices can only be selected in the Balance tab");
            return Err(StateError::WrongTab {
                expected: TabState::Balance,
                actual: self.state.current_tab,
            });
        }
        for name in [first, second] {
            if !self.state.is_device_available(name) {
                tracing::warn!("Cannot select unknown balance device: {}", name);
                return Err(StateError::DeviceNotFound(name.to_string()));
            }
        }

        self.state.selected_device1 = Some(first.to_string());
        self.state.selected_device2 = Some(second.to_string());
        tracing::info!("Selected balance devices: {}, {}", first, second);

        self.notify(AudioStateChangeEvent::SelectionChanged {
            device: Some(first.to_string()),
            tab: TabState::Balance,
        });
        Ok(())
    }

    pub fn set_current_tab(&mut self, tab: TabState) {
        if self.state.current_tab != tab {
            tracing::info!("Tab changed: {} -> {}", self.state.current_tab.name(), tab.name());
            self.state.current_tab = tab;
            self.notify(AudioStateChangeEvent::TabChanged { tab });
        }
        self.perform_smart_auto_selection();
    }

    // === Volume ===

    /// Set one session's volume, clamped to [0, 100]
    pub fn set_device_volume(&mut self, process_name: &str, volume: f32) -> Result<(), StateError> {
        let volume = clamp_volume(volume);
        let now = self.clock.now_ms();

        let Some(device) = self.state.current_status.get_mut(process_name) else {
            tracing::warn!("Cannot set volume of unknown device: {}", process_name);
            return Err(StateError::DeviceNotFound(process_name.to_string()));
        };
        device.volume = volume;
        device.last_update = now;
        self.state.last_update_ms = now;

        tracing::info!("Volume {} = {}", process_name, volume);
        self.notify(AudioStateChangeEvent::VolumeChanged {
            target: DeviceTarget::Session(process_name.to_string()),
            volume,
        });
        Ok(())
    }

    pub fn set_default_device_volume(&mut self, volume: f32) -> Result<(), StateError> {
        let volume = clamp_volume(volume);
        let Some(default_device) = self.state.default_device.as_mut() else {
            tracing::warn!("No default device available for volume control");
            return Err(StateError::NoDefaultDevice);
        };
        default_device.volume = volume;
        self.state.last_update_ms = self.clock.now_ms();

        tracing::info!("Default device volume = {}", volume);
        self.notify(AudioStateChangeEvent::VolumeChanged {
            target: DeviceTarget::Default,
            volume,
        });
        Ok(())
    }

    /// Apply a volume to whatever the current tab controls
    pub fn set_volume_for_current_device(&mut self, volume: f32) -> Result<(), StateError> {
        match self.state.current_tab {
            TabState::Master => self.set_default_device_volume(volume),
            TabState::Single => {
                let name = self.current_selection_name()?;
                self.set_device_volume(&name, volume)
            }
            TabState::Balance => self.set_balance_volume(volume, 0.0),
        }
    }

    /// Spread `volume` across both balance devices
    ///
    /// `ratio` in [-1, 1]: positive values attenuate the first device,
    /// negative values the second; 0 gives both the full volume.
    pub fn set_balance_volume(&mut self, volume: f32, ratio: f32) -> Result<(), StateError> {
        let (first, second) = self.balance_selection_names()?;
        let volume = clamp_volume(volume);
        let ratio = if ratio.is_finite() {
            ratio.clamp(-1.0, 1.0)
        } else {
            0.0
        };

        let first_volume = clamp_volume(volume * (1.0 - ratio.max(0.0)));
        let second_volume = clamp_volume(volume * (1.0 + ratio.min(0.0)));
        self.write_balance_volumes(&first, first_volume, &second, second_volume);

        tracing::info!(
            "Balance volume {} (ratio {}): {}={}, {}={}",
            volume,
            ratio,
            first,
            first_volume,
            second,
            second_volume
        );
        self.notify(AudioStateChangeEvent::VolumeChanged {
            target: DeviceTarget::Balance,
            volume,
        });
        Ok(())
    }

    pub fn set_balance_device_volumes(
        &mut self,
        first_volume: f32,
        second_volume: f32,
    ) -> Result<(), StateError> {
        let (first, second) = self.balance_selection_names()?;
        let first_volume = clamp_volume(first_volume);
        let second_volume = clamp_volume(second_volume);
        self.write_balance_volumes(&first, first_volume, &second, second_volume);

        tracing::info!(
            "Balance device volumes: {}={}, {}={}",
            first,
            first_volume,
            second,
            second_volume
        );
        self.notify(AudioStateChangeEvent::VolumeChanged {
            target: DeviceTarget::Balance,
            volume: first_volume,
        });
        Ok(())
    }

    fn write_balance_volumes(&mut self, first: &str, v1: f32, second: &str, v2: f32) {
        let now = self.clock.now_ms();
        // Same session on both sides: the second write wins
        for (name, volume) in [(first, v1), (second, v2)] {
            if let Some(device) = self.state.current_status.get_mut(name) {
                device.volume = volume;
                device.last_update = now;
            }
        }
        self.state.last_update_ms = now;
    }

    // === Mute ===

    pub fn mute_device(&mut self, process_name: &str) -> Result<(), StateError> {
        self.set_device_mute(process_name, true)
    }

    pub fn unmute_device(&mut self, process_name: &str) -> Result<(), StateError> {
        self.set_device_mute(process_name, false)
    }

    /// Set a session's mute flag; notifies even when nothing changed
    pub fn set_device_mute(&mut self, process_name: &str, muted: bool) -> Result<(), StateError> {
        let now = self.clock.now_ms();
        let Some(device) = self.state.current_status.get_mut(process_name) else {
            tracing::warn!("Cannot change mute of unknown device: {}", process_name);
            return Err(StateError::DeviceNotFound(process_name.to_string()));
        };
        device.is_muted = muted;
        device.last_update = now;
        self.state.last_update_ms = now;

        tracing::info!("{} {}", if muted { "Muted" } else { "Unmuted" }, process_name);
        self.notify(AudioStateChangeEvent::MuteChanged {
            target: DeviceTarget::Session(process_name.to_string()),
            muted,
        });
        Ok(())
    }

    pub fn set_default_device_mute(&mut self, muted: bool) -> Result<(), StateError> {
        let Some(default_device) = self.state.default_device.as_mut() else {
            tracing::warn!("No default device available for mute control");
            return Err(StateError::NoDefaultDevice);
        };
        default_device.is_muted = muted;
        self.state.last_update_ms = self.clock.now_ms();

        self.notify(AudioStateChangeEvent::MuteChanged {
            target: DeviceTarget::Default,
            muted,
        });
        Ok(())
    }

    pub fn mute_current_device(&mut self) -> Result<(), StateError> {
        self.set_current_mute(true)
    }

    pub fn unmute_current_device(&mut self) -> Result<(), StateError> {
        self.set_current_mute(false)
    }

    fn set_current_mute(&mut self, muted: bool) -> Result<(), StateError> {
        match self.state.current_tab {
            TabState::Master => self.set_default_device_mute(muted),
            TabState::Single => {
                let name = self.current_selection_name()?;
                self.set_device_mute(&name, muted)
            }
            TabState::Balance => self.set_balance_mute(muted),
        }
    }

    pub fn mute_balance_devices(&mut self) -> Result<(), StateError> {
        self.set_balance_mute(true)
    }

    pub fn unmute_balance_devices(&mut self) -> Result<(), StateError> {
        self.set_balance_mute(false)
    }

    fn set_balance_mute(&mut self, muted: bool) -> Result<(), StateError> {
        let (first, second) = self.balance_selection_names()?;
        let now = self.clock.now_ms();
        for name in [&first, &second] {
            if let Some(device) = self.state.current_status.get_mut(name.as_str()) {
                device.is_muted = muted;
                device.last_update = now;
            }
        }
        self.state.last_update_ms = now;

        tracing::info!(
            "{} balance devices: {}, {}",
            if muted { "Muted" } else { "Unmuted" },
            first,
            second
        );
        self.notify(AudioStateChangeEvent::MuteChanged {
            target: DeviceTarget::Balance,
            muted,
        });
        Ok(())
    }

    fn current_selection_name(&self) -> Result<String, StateError> {
        self.state
            .current_device()
            .map(|d| d.process_name.clone())
            .ok_or(StateError::NoSelection(self.state.current_tab))
    }

    fn balance_selection_names(&self) -> Result<(String, String), StateError> {
        match self.state.balance_devices() {
            (Some(first), Some(second)) => {
                Ok((first.process_name.clone(), second.process_name.clone()))
            }
            _ => {
                tracing::warn!("Balance devices not selected");
                Err(StateError::NoSelection(TabState::Balance))
            }
        }
    }

    // === Outbound ===

    /// Snapshot of the local view, ready to publish as a STATUS_MESSAGE
    ///
    /// Publishing is left to the caller so that updates received from the
    /// host are never echoed back automatically.
    pub fn build_status_update(&self, device_id: &str) -> AudioStatusData {
        let sessions: Vec<_> = self
            .state
            .devices()
            .filter(|d| !d.stale)
            .map(AudioLevel::to_session)
            .collect();

        AudioStatusData {
            active_session_count: sessions.len() as u32,
            sessions,
            default_device: self.state.default_device.clone(),
            timestamp: self.clock.now_ms(),
            reason: reasons::UPDATE_RESPONSE.to_string(),
            originating_device_id: device_id.to_string(),
            originating_request_id: String::new(),
        }
    }

    // === Notification ===

    fn notify(&mut self, event: AudioStateChangeEvent) {
        let mut deferred = Vec::new();
        for (_, subscriber) in self.subscribers.iter_mut() {
            let mut notification = Notification::new(&event, &self.state, &mut deferred);
            subscriber(&mut notification);
        }
        self.deferred.extend(deferred);

        if !self.draining {
            self.drain_deferred();
        }
    }

    fn drain_deferred(&mut self) {
        self.draining = true;
        let mut rounds = 0;
        while !self.deferred.is_empty() {
            if rounds == MAX_DEFERRED_ROUNDS {
                tracing::warn!(
                    "Dropping {} deferred audio commands after {} rounds",
                    self.deferred.len(),
                    MAX_DEFERRED_ROUNDS
                );
                self.deferred.clear();
                break;
            }
            let batch = std::mem::take(&mut self.deferred);
            for command in batch {
                self.apply(command);
            }
            rounds += 1;
        }
        self.draining = false;
    }

    /// Run a command, logging rather than returning failures
    pub fn apply(&mut self, command: AudioCommand) {
        tracing::debug!("Applying audio command {:?}", command);
        let result = match command {
            AudioCommand::SelectDevice(name) => self.select_device(&name),
            AudioCommand::SelectBalanceDevices(first, second) => {
                self.select_balance_devices(&first, &second)
            }
            AudioCommand::SetTab(tab) => {
                self.set_current_tab(tab);
                Ok(())
            }
            AudioCommand::SetDeviceVolume(name, volume) => self.set_device_volume(&name, volume),
            AudioCommand::SetCurrentVolume(volume) => self.set_volume_for_current_device(volume),
            AudioCommand::MuteDevice(name) => self.mute_device(&name),
            AudioCommand::UnmuteDevice(name) => self.unmute_device(&name),
            AudioCommand::MuteCurrent => self.mute_current_device(),
            AudioCommand::UnmuteCurrent => self.unmute_current_device(),
            AudioCommand::SetBalanceVolume { volume, ratio } => {
                self.set_balance_volume(volume, ratio)
            }
        };
        if let Err(e) = result {
            tracing::warn!("Audio command failed: {}", e);
        }
    }
}

/// Clamp to [0, 100]; NaN becomes 0
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::protocol::data::{DefaultDeviceStatus, SessionStatus};
    use proptest::prelude::*;

    fn manager_with(tab: TabState) -> (AudioStateManager, ManualClock) {
        let clock = ManualClock::new(0);
        let config = AudioConfig {
            initial_tab: tab,
            ..Default::default()
        };
        (AudioStateManager::new(&config, Arc::new(clock.clone())), clock)
    }

    fn snapshot(sessions: &[(&str, f32, bool)]) -> AudioStatusData {
        AudioStatusData {
            sessions: sessions
                .iter()
                .map(|(name, volume, muted)| SessionStatus::new(*name, *volume, *muted))
                .collect(),
            ..Default::default()
        }
    }

    fn record_events(manager: &mut AudioStateManager) -> Arc<Mutex<Vec<AudioStateChangeEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        manager.subscribe(move |n| sink.lock().push(n.event().clone()));
        events
    }

    #[test]
    fn test_merge_updates_in_place() {
        let (mut manager, _) = manager_with(TabState::Single);

        manager.on_audio_status_received(&snapshot(&[("chrome.exe", 40.0, false)]));
        assert_eq!(manager.state().device("chrome.exe").unwrap().volume, 40.0);

        manager.on_audio_status_received(&snapshot(&[("chrome.exe", 70.0, false)]));
        assert_eq!(manager.state().device("chrome.exe").unwrap().volume, 70.0);
        assert_eq!(manager.state().device_count(), 1);
    }

    #[test]
    fn test_missing_session_goes_stale_then_purged() {
        let (mut manager, _) = manager_with(TabState::Single);
        manager.on_audio_status_received(&snapshot(&[("a.exe", 10.0, false), ("b.exe", 20.0, false)]));
        manager.select_device("b.exe").unwrap();

        manager.on_audio_status_received(&snapshot(&[("a.exe", 10.0, false)]));
        let b = manager.state().device("b.exe").unwrap();
        assert!(b.stale);
        assert_eq!(b.missed_snapshots, 1);
        assert_eq!(manager.state().selected_device().unwrap().process_name, "b.exe");

        // Default grace is two further snapshots
        manager.on_audio_status_received(&snapshot(&[("a.exe", 10.0, false)]));
        assert!(manager.state().device("b.exe").is_some());
        manager.on_audio_status_received(&snapshot(&[("a.exe", 10.0, false)]));
        assert!(manager.state().device("b.exe").is_none());

        // Selection healed onto the remaining device, never dangling
        assert_eq!(manager.state().selected_device().unwrap().process_name, "a.exe");
    }

    #[test]
    fn test_stale_session_revives() {
        let (mut manager, _) = manager_with(TabState::Single);
        manager.on_audio_status_received(&snapshot(&[("a.exe", 10.0, false)]));
        manager.on_audio_status_received(&snapshot(&[]));
        assert!(manager.state().device("a.exe").unwrap().stale);

        manager.on_audio_status_received(&snapshot(&[("a.exe", 15.0, true)]));
        let a = manager.state().device("a.exe").unwrap();
        assert!(!a.stale);
        assert_eq!(a.missed_snapshots, 0);
        assert!(a.is_muted);
    }

    #[test]
    fn test_merge_notifies_selection_then_devices() {
        let (mut manager, _) = manager_with(TabState::Single);
        let events = record_events(&mut manager);

        manager.on_audio_status_received(&snapshot(&[("a.exe", 10.0, false)]));
        assert_eq!(
            *events.lock(),
            vec![
                AudioStateChangeEvent::SelectionChanged {
                    device: Some("a.exe".into()),
                    tab: TabState::Single
                },
                AudioStateChangeEvent::DevicesUpdated,
            ]
        );
    }

    #[test]
    fn test_auto_select_prefers_default_device() {
        let (mut manager, _) = manager_with(TabState::Single);
        let mut status = snapshot(&[("a.exe", 10.0, false), ("spotify.exe", 50.0, false)]);
        status.default_device = Some(DefaultDeviceStatus {
            friendly_name: "spotify.exe".into(),
            ..Default::default()
        });

        manager.on_audio_status_received(&status);
        assert_eq!(
            manager.state().selected_device().unwrap().process_name,
            "spotify.exe"
        );
    }

    #[test]
    fn test_auto_select_never_overrides_valid_selection() {
        let (mut manager, _) = manager_with(TabState::Single);
        manager.on_audio_status_received(&snapshot(&[("a.exe", 10.0, false), ("b.exe", 20.0, false)]));
        manager.select_device("b.exe").unwrap();

        manager.on_audio_status_received(&snapshot(&[("a.exe", 10.0, false), ("b.exe", 25.0, false)]));
        assert_eq!(manager.state().selected_device().unwrap().process_name, "b.exe");
    }

    #[test]
    fn test_balance_auto_select_picks_distinct_devices() {
        let (mut manager, _) = manager_with(TabState::Balance);
        manager.on_audio_status_received(&snapshot(&[("a.exe", 10.0, false), ("b.exe", 20.0, false)]));

        let (first, second) = manager.state().balance_devices();
        assert_eq!(first.unwrap().process_name, "a.exe");
        assert_eq!(second.unwrap().process_name, "b.exe");
    }

    #[test]
    fn test_balance_single_device_fills_both_sides() {
        let (mut manager, _) = manager_with(TabState::Balance);
        manager.on_audio_status_received(&snapshot(&[("a.exe", 10.0, false)]));

        let (first, second) = manager.state().balance_devices();
        assert_eq!(first.unwrap().process_name, "a.exe");
        assert_eq!(second.unwrap().process_name, "a.exe");
    }

    #[test]
    fn test_purged_balance_device_is_reassigned() {
        let (mut manager, _) = manager_with(TabState::Balance);
        manager.on_audio_status_received(&snapshot(&[
            ("a.exe", 10.0, false),
            ("b.exe", 20.0, false),
            ("c.exe", 30.0, false),
        ]));
        let (first, second) = manager.state().balance_devices();
        assert_eq!(first.unwrap().process_name, "a.exe");
        assert_eq!(second.unwrap().process_name, "b.exe");

        for _ in 0..3 {
            manager.on_audio_status_received(&snapshot(&[("a.exe", 10.0, false), ("c.exe", 30.0, false)]));
        }
        assert!(manager.state().device("b.exe").is_none());

        // Second slot moves to a live session other than the first slot's
        assert_eq!(manager.state().selected_device2.as_deref(), Some("c.exe"));
        let (first, second) = manager.state().balance_devices();
        assert_eq!(first.unwrap().process_name, "a.exe");
        assert_eq!(second.unwrap().process_name, "c.exe");
        assert!(manager.state().has_valid_selection());
    }

    #[test]
    fn test_purge_to_zero_devices_clears_selection() {
        let (mut manager, _) = manager_with(TabState::Single);
        manager.on_audio_status_received(&snapshot(&[("a.exe", 10.0, false)]));
        assert_eq!(manager.state().selected_device.as_deref(), Some("a.exe"));

        for _ in 0..3 {
            manager.on_audio_status_received(&snapshot(&[]));
        }
        assert_eq!(manager.state().device_count(), 0);
        assert_eq!(manager.state().selected_device, None);
        assert!(manager.state().selected_device().is_none());
        assert!(!manager.state().has_valid_selection());
    }

    #[test]
    fn test_purge_to_zero_devices_clears_balance_slots() {
        let (mut manager, _) = manager_with(TabState::Balance);
        manager.on_audio_status_received(&snapshot(&[("a.exe", 10.0, false), ("b.exe", 20.0, false)]));

        for _ in 0..3 {
            manager.on_audio_status_received(&snapshot(&[]));
        }
        assert!(!manager.state().has_devices());
        assert_eq!(manager.state().selected_device1, None);
        assert_eq!(manager.state().selected_device2, None);
        assert_eq!(manager.state().balance_devices(), (None, None));
    }

    #[test]
    fn test_select_unknown_device_is_reported() {
        let (mut manager, _) = manager_with(TabState::Single);
        let events = record_events(&mut manager);

        assert_eq!(
            manager.select_device("ghost.exe"),
            Err(StateError::DeviceNotFound("ghost.exe".into()))
        );
        assert!(events.lock().is_empty());
    }

    #[test]
    fn test_select_balance_devices_requires_balance_tab() {
        let (mut manager, _) = manager_with(TabState::Single);
        manager.on_audio_status_received(&snapshot(&[("a.exe", 10.0, false), ("b.exe", 20.0, false)]));
        assert!(matches!(
            manager.select_balance_devices("a.exe", "b.exe"),
            Err(StateError::WrongTab { .. })
        ));

        manager.set_current_tab(TabState::Balance);
        manager.select_balance_devices("b.exe", "a.exe").unwrap();
        let (first, second) = manager.state().balance_devices();
        assert_eq!(first.unwrap().process_name, "b.exe");
        assert_eq!(second.unwrap().process_name, "a.exe");
    }

    #[test]
    fn test_volume_clamping_and_unknown_device() {
        let (mut manager, _) = manager_with(TabState::Single);
        manager.on_audio_status_received(&snapshot(&[("x", 50.0, false)]));
        let events = record_events(&mut manager);

        manager.set_device_volume("x", 150.0).unwrap();
        assert_eq!(manager.state().device("x").unwrap().volume, 100.0);

        manager.set_device_volume("x", -5.0).unwrap();
        assert_eq!(manager.state().device("x").unwrap().volume, 0.0);

        let before = events.lock().len();
        assert!(manager.set_device_volume("nonexistent", 50.0).is_err());
        assert_eq!(events.lock().len(), before);
        assert!(manager.state().device("nonexistent").is_none());
    }

    #[test]
    fn test_fractional_volume_preserved() {
        let (mut manager, _) = manager_with(TabState::Single);
        manager.on_audio_status_received(&snapshot(&[("x", 33.3, false)]));
        manager.set_volume_for_current_device(42.5).unwrap();
        assert_eq!(manager.state().current_volume(), 42.5);
    }

    #[test]
    fn test_mute_is_idempotent_but_notifies() {
        let (mut manager, _) = manager_with(TabState::Single);
        manager.on_audio_status_received(&snapshot(&[("x", 50.0, false)]));
        let events = record_events(&mut manager);

        manager.mute_current_device().unwrap();
        manager.mute_current_device().unwrap();
        assert!(manager.state().is_current_muted());

        let mutes = events
            .lock()
            .iter()
            .filter(|e| matches!(e, AudioStateChangeEvent::MuteChanged { muted: true, .. }))
            .count();
        assert_eq!(mutes, 2);

        manager.unmute_device("x").unwrap();
        assert!(!manager.state().device("x").unwrap().is_muted);
    }

    #[test]
    fn test_master_tab_controls_default_device() {
        let (mut manager, _) = manager_with(TabState::Master);
        assert_eq!(
            manager.set_volume_for_current_device(30.0),
            Err(StateError::NoDefaultDevice)
        );

        let mut status = snapshot(&[("x", 50.0, false)]);
        status.default_device = Some(DefaultDeviceStatus {
            friendly_name: "Speakers".into(),
            volume: 80.0,
            ..Default::default()
        });
        manager.on_audio_status_received(&status);

        manager.set_volume_for_current_device(30.0).unwrap();
        manager.mute_current_device().unwrap();

        let default_device = manager.state().default_device().unwrap();
        assert_eq!(default_device.volume, 30.0);
        assert!(default_device.is_muted);
        // Session untouched
        assert_eq!(manager.state().device("x").unwrap().volume, 50.0);
    }

    #[test]
    fn test_default_device_replaced_wholesale() {
        let (mut manager, _) = manager_with(TabState::Master);
        let mut status = snapshot(&[]);
        status.default_device = Some(DefaultDeviceStatus {
            friendly_name: "Speakers".into(),
            ..Default::default()
        });
        manager.on_audio_status_received(&status);
        assert!(manager.state().default_device().is_some());

        manager.on_audio_status_received(&snapshot(&[]));
        assert!(manager.state().default_device().is_none());
    }

    #[test]
    fn test_balance_volume_distribution() {
        let (mut manager, _) = manager_with(TabState::Balance);
        manager.on_audio_status_received(&snapshot(&[("a", 0.0, false), ("b", 0.0, false)]));

        manager.set_balance_volume(80.0, 0.5).unwrap();
        assert_eq!(manager.state().device("a").unwrap().volume, 40.0);
        assert_eq!(manager.state().device("b").unwrap().volume, 80.0);

        manager.set_balance_volume(80.0, -0.25).unwrap();
        assert_eq!(manager.state().device("a").unwrap().volume, 80.0);
        assert_eq!(manager.state().device("b").unwrap().volume, 60.0);

        manager.set_volume_for_current_device(50.0).unwrap();
        assert_eq!(manager.state().device("a").unwrap().volume, 50.0);
        assert_eq!(manager.state().device("b").unwrap().volume, 50.0);

        manager.set_balance_device_volumes(10.0, 120.0).unwrap();
        assert_eq!(manager.state().device("a").unwrap().volume, 10.0);
        assert_eq!(manager.state().device("b").unwrap().volume, 100.0);
    }

    #[test]
    fn test_balance_mute() {
        let (mut manager, _) = manager_with(TabState::Balance);
        assert_eq!(
            manager.mute_balance_devices(),
            Err(StateError::NoSelection(TabState::Balance))
        );

        manager.on_audio_status_received(&snapshot(&[("a", 10.0, false), ("b", 10.0, false)]));
        manager.mute_current_device().unwrap();
        assert!(manager.state().device("a").unwrap().is_muted);
        assert!(manager.state().device("b").unwrap().is_muted);

        manager.unmute_balance_devices().unwrap();
        assert!(!manager.state().device("b").unwrap().is_muted);
    }

    #[test]
    fn test_tab_switch_reruns_auto_selection() {
        let (mut manager, _) = manager_with(TabState::Master);
        manager.on_audio_status_received(&snapshot(&[("a", 10.0, false), ("b", 10.0, false)]));
        let events = record_events(&mut manager);

        manager.set_current_tab(TabState::Balance);
        let recorded = events.lock().clone();
        assert_eq!(
            recorded[0],
            AudioStateChangeEvent::TabChanged {
                tab: TabState::Balance
            }
        );
        assert!(manager.state().has_valid_selection());
    }

    #[test]
    fn test_deferred_commands_run_after_round() {
        let (mut manager, _) = manager_with(TabState::Single);
        manager.on_audio_status_received(&snapshot(&[("a", 10.0, false), ("b", 10.0, false)]));

        let order = Arc::new(Mutex::new(Vec::new()));
        let first = order.clone();
        manager.subscribe(move |n| {
            if let AudioStateChangeEvent::VolumeChanged { .. } = n.event() {
                first.lock().push("first");
                n.defer(AudioCommand::MuteDevice("b".into()));
            }
        });
        let second = order.clone();
        manager.subscribe(move |n| {
            match n.event() {
                AudioStateChangeEvent::VolumeChanged { .. } => second.lock().push("second"),
                AudioStateChangeEvent::MuteChanged { .. } => second.lock().push("mute"),
                _ => {}
            }
        });

        manager.set_device_volume("a", 20.0).unwrap();
        assert_eq!(*order.lock(), vec!["first", "second", "mute"]);
        assert!(manager.state().device("b").unwrap().is_muted);
    }

    #[test]
    fn test_runaway_deferral_is_bounded() {
        let (mut manager, _) = manager_with(TabState::Single);
        manager.on_audio_status_received(&snapshot(&[("a", 10.0, false)]));

        let count = Arc::new(Mutex::new(0usize));
        let seen = count.clone();
        manager.subscribe(move |n| {
            if let AudioStateChangeEvent::MuteChanged { .. } = n.event() {
                *seen.lock() += 1;
                n.defer(AudioCommand::MuteDevice("a".into()));
            }
        });

        manager.mute_device("a").unwrap();
        assert_eq!(*count.lock(), MAX_DEFERRED_ROUNDS + 1);
    }

    #[test]
    fn test_unsubscribe() {
        let (mut manager, _) = manager_with(TabState::Single);
        let events = Arc::new(Mutex::new(0usize));
        let sink = events.clone();
        let id = manager.subscribe(move |_| *sink.lock() += 1);

        manager.set_current_tab(TabState::Balance);
        assert!(manager.unsubscribe(id));
        assert!(!manager.unsubscribe(id));
        manager.set_current_tab(TabState::Single);
        assert_eq!(*events.lock(), 1);
    }

    #[test]
    fn test_build_status_update() {
        let (mut manager, clock) = manager_with(TabState::Single);
        manager.on_audio_status_received(&snapshot(&[("a", 10.0, false), ("b", 20.0, true)]));
        manager.on_audio_status_received(&snapshot(&[("a", 15.0, false)]));
        clock.set(900);

        let update = manager.build_status_update("ME");
        assert_eq!(update.sessions.len(), 1);
        assert_eq!(update.sessions[0].volume, 15.0);
        assert_eq!(update.active_session_count, 1);
        assert_eq!(update.reason, reasons::UPDATE_RESPONSE);
        assert_eq!(update.originating_device_id, "ME");
        assert_eq!(update.timestamp, 900);
    }

    proptest! {
        #[test]
        fn prop_set_volume_always_in_range(volume in -1000.0f32..1000.0) {
            let (mut manager, _) = manager_with(TabState::Single);
            manager.on_audio_status_received(&snapshot(&[("x", 50.0, false)]));
            manager.set_device_volume("x", volume).unwrap();

            let stored = manager.state().device("x").unwrap().volume;
            prop_assert!((0.0..=100.0).contains(&stored));
            if (0.0..=100.0).contains(&volume) {
                prop_assert_eq!(stored, volume);
            }
        }
    }
}
