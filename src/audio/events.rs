//! State change events and the subscriber contract

use crate::audio::state::{AudioAppState, TabState};

/// What a volume or mute change applied to
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceTarget {
    /// The host's default endpoint (Master tab)
    Default,
    /// A single session
    Session(String),
    /// Both Balance tab sessions
    Balance,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AudioStateChangeEvent {
    /// A status snapshot was merged
    DevicesUpdated,
    SelectionChanged {
        device: Option<String>,
        tab: TabState,
    },
    VolumeChanged {
        target: DeviceTarget,
        volume: f32,
    },
    TabChanged {
        tab: TabState,
    },
    /// Fired even when the mute flag did not change
    MuteChanged {
        target: DeviceTarget,
        muted: bool,
    },
}

/// Mutation requested from inside a subscriber
///
/// Applied once the current notification round has finished.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioCommand {
    SelectDevice(String),
    SelectBalanceDevices(String, String),
    SetTab(TabState),
    SetDeviceVolume(String, f32),
    SetCurrentVolume(f32),
    MuteDevice(String),
    UnmuteDevice(String),
    MuteCurrent,
    UnmuteCurrent,
    SetBalanceVolume { volume: f32, ratio: f32 },
}

/// View handed to each subscriber for one event
pub struct Notification<'a> {
    event: &'a AudioStateChangeEvent,
    state: &'a AudioAppState,
    deferred: &'a mut Vec<AudioCommand>,
}

impl<'a> Notification<'a> {
    pub(crate) fn new(
        event: &'a AudioStateChangeEvent,
        state: &'a AudioAppState,
        deferred: &'a mut Vec<AudioCommand>,
    ) -> Self {
        Self {
            event,
            state,
            deferred,
        }
    }

    pub fn event(&self) -> &AudioStateChangeEvent {
        self.event
    }

    /// State after the mutation that produced this event
    pub fn state(&self) -> &AudioAppState {
        self.state
    }

    /// Queue a mutation to run after every subscriber has seen this event
    pub fn defer(&mut self, command: AudioCommand) {
        self.deferred.push(command);
    }
}

/// Callback invoked synchronously, in subscription order
pub type AudioSubscriber = Box<dyn FnMut(&mut Notification<'_>) + Send>;

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);
