//! Audio state to display updates
//!
//! Subscribes to the audio manager and turns each state change into UI
//! updates for the active tab. Runs in the notifying context, so it only
//! reads state and enqueues.

use crate::audio::events::{AudioStateChangeEvent, Notification, SubscriptionId};
use crate::audio::manager::AudioStateManager;
use crate::audio::state::{default_device_label, AudioAppState, TabState};
use crate::ui::queue::{UiUpdate, UiUpdateSender};

/// Device label and volume updates for `tab`
pub fn tab_view(state: &AudioAppState, tab: TabState) -> Vec<UiUpdate> {
    let mut updates = Vec::with_capacity(2);
    match tab {
        TabState::Master => {
            let label = match state.default_device() {
                Some(device) => default_device_label(device).to_string(),
                None => state
                    .selected_device()
                    .map(|d| d.label().to_string())
                    .unwrap_or_default(),
            };
            updates.push(UiUpdate::MasterDevice { label });
        }
        TabState::Single => {
            let label = state
                .selected_device()
                .map(|d| d.label().to_string())
                .unwrap_or_default();
            updates.push(UiUpdate::SingleDevice { label });
        }
        TabState::Balance => {
            let (first, second) = state.balance_devices();
            updates.push(UiUpdate::BalanceDevices {
                first: first.map(|d| d.label().to_string()).unwrap_or_default(),
                second: second.map(|d| d.label().to_string()).unwrap_or_default(),
            });
        }
    }
    updates.push(volume_view(state, tab));
    updates
}

/// Volume update for `tab`
pub fn volume_view(state: &AudioAppState, tab: TabState) -> UiUpdate {
    match tab {
        TabState::Master => {
            let (volume, muted) = match state.default_device() {
                Some(device) => (device.volume, device.is_muted),
                None => state
                    .selected_device()
                    .map(|d| (d.volume, d.is_muted))
                    .unwrap_or((0.0, false)),
            };
            UiUpdate::MasterVolume { volume, muted }
        }
        TabState::Single => {
            let (volume, muted) = state
                .selected_device()
                .map(|d| (d.volume, d.is_muted))
                .unwrap_or((0.0, false));
            UiUpdate::SingleVolume { volume, muted }
        }
        TabState::Balance => {
            let (first, second) = state.balance_devices();
            UiUpdate::BalanceVolume {
                first: first.map(|d| d.volume).unwrap_or(0.0),
                second: second.map(|d| d.volume).unwrap_or(0.0),
                muted: matches!((first, second), (Some(a), Some(b)) if a.is_muted && b.is_muted),
            }
        }
    }
}

/// Updates produced by one notification
pub fn updates_for(notification: &Notification<'_>) -> Vec<UiUpdate> {
    let state = notification.state();
    let tab = state.current_tab();
    match notification.event() {
        AudioStateChangeEvent::DevicesUpdated => {
            let mut updates = tab_view(state, tab);
            updates.push(UiUpdate::StatusOverlayRefresh);
            updates
        }
        AudioStateChangeEvent::SelectionChanged { tab, .. } => tab_view(state, *tab),
        AudioStateChangeEvent::TabChanged { tab } => tab_view(state, *tab),
        AudioStateChangeEvent::VolumeChanged { .. } | AudioStateChangeEvent::MuteChanged { .. } => {
            vec![volume_view(state, tab)]
        }
    }
}

/// Keep the display in step with the audio manager
pub fn attach(manager: &mut AudioStateManager, sender: UiUpdateSender) -> SubscriptionId {
    manager.subscribe(move |notification| {
        for update in updates_for(notification) {
            sender.send(update);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::AudioConfig;
    use crate::protocol::data::{
        AudioStatusData, DataFlow, DefaultDeviceStatus, DeviceRole, SessionState, SessionStatus,
    };
    use crate::ui::queue::create_shared_queue;
    use std::sync::Arc;

    fn session(name: &str, volume: f32) -> SessionStatus {
        SessionStatus {
            process_id: 1,
            process_name: name.to_string(),
            display_name: name.to_string(),
            volume,
            is_muted: false,
            state: SessionState::Active,
        }
    }

    fn status(sessions: Vec<SessionStatus>) -> AudioStatusData {
        AudioStatusData {
            active_session_count: sessions.len() as u32,
            sessions,
            default_device: Some(DefaultDeviceStatus {
                friendly_name: "Speakers".to_string(),
                volume: 40.0,
                is_muted: false,
                data_flow: DataFlow::Render,
                device_role: DeviceRole::Console,
            }),
            ..Default::default()
        }
    }

    fn drain(sender: &UiUpdateSender) -> Vec<UiUpdate> {
        let mut out = Vec::new();
        while let Some(update) = sender.queue().pop() {
            out.push(update);
        }
        out
    }

    #[test]
    fn test_snapshot_refreshes_master_view() {
        let mut manager =
            AudioStateManager::new(&AudioConfig::default(), Arc::new(ManualClock::new(1)));
        let sender = UiUpdateSender::new(create_shared_queue(32), 0.5);
        attach(&mut manager, sender.clone());

        manager.on_audio_status_received(&status(vec![session("spotify.exe", 70.0)]));

        let updates = drain(&sender);
        assert!(updates.contains(&UiUpdate::MasterDevice {
            label: "Speakers".to_string()
        }));
        assert!(updates.contains(&UiUpdate::MasterVolume {
            volume: 40.0,
            muted: false
        }));
        assert_eq!(updates.last(), Some(&UiUpdate::StatusOverlayRefresh));
    }

    #[test]
    fn test_single_tab_volume_change() {
        let mut manager =
            AudioStateManager::new(&AudioConfig::default(), Arc::new(ManualClock::new(1)));
        manager.on_audio_status_received(&status(vec![session("spotify.exe", 70.0)]));
        manager.set_current_tab(TabState::Single);

        let sender = UiUpdateSender::new(create_shared_queue(32), 0.5);
        attach(&mut manager, sender.clone());

        manager.set_device_volume("spotify.exe", 25.0).unwrap();
        assert_eq!(
            drain(&sender),
            vec![UiUpdate::SingleVolume {
                volume: 25.0,
                muted: false
            }]
        );
    }

    #[test]
    fn test_balance_tab_view() {
        let mut manager =
            AudioStateManager::new(&AudioConfig::default(), Arc::new(ManualClock::new(1)));
        manager.on_audio_status_received(&status(vec![
            session("a.exe", 10.0),
            session("b.exe", 90.0),
        ]));
        let sender = UiUpdateSender::new(create_shared_queue(32), 0.5);
        attach(&mut manager, sender.clone());

        manager.set_current_tab(TabState::Balance);
        manager.select_balance_devices("a.exe", "b.exe").unwrap();

        let updates = drain(&sender);
        assert_eq!(
            updates.last(),
            Some(&UiUpdate::BalanceVolume {
                first: 10.0,
                second: 90.0,
                muted: false
            })
        );
        assert!(updates.contains(&UiUpdate::BalanceDevices {
            first: "a.exe".to_string(),
            second: "b.exe".to_string()
        }));
    }
}
