//! Bounded UI update queue
//!
//! Any thread may enqueue; one render loop drains. The queue never blocks a
//! producer: when full, the newest update is dropped and counted.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::queue::ArrayQueue;

/// A discrete display update
#[derive(Debug, Clone, PartialEq)]
pub enum UiUpdate {
    WifiStatus { status: String, connected: bool },
    NetworkInfo { ssid: String, ip: String },
    SystemTelemetry { free_heap_bytes: u64, uptime_ms: u64 },
    FpsDisplay { fps: f32 },
    MasterVolume { volume: f32, muted: bool },
    SingleVolume { volume: f32, muted: bool },
    BalanceVolume { first: f32, second: f32, muted: bool },
    MasterDevice { label: String },
    SingleDevice { label: String },
    BalanceDevices { first: String, second: String },
    StatusOverlayRefresh,
}

impl UiUpdate {
    /// Short name of the variant, for logs and stats
    pub fn kind(&self) -> &'static str {
        match self {
            UiUpdate::WifiStatus { .. } => "wifi_status",
            UiUpdate::NetworkInfo { .. } => "network_info",
            UiUpdate::SystemTelemetry { .. } => "system_telemetry",
            UiUpdate::FpsDisplay { .. } => "fps",
            UiUpdate::MasterVolume { .. } => "master_volume",
            UiUpdate::SingleVolume { .. } => "single_volume",
            UiUpdate::BalanceVolume { .. } => "balance_volume",
            UiUpdate::MasterDevice { .. } => "master_device",
            UiUpdate::SingleDevice { .. } => "single_device",
            UiUpdate::BalanceDevices { .. } => "balance_devices",
            UiUpdate::StatusOverlayRefresh => "status_overlay",
        }
    }
}

/// Lock-free bounded FIFO of UI updates
pub struct UiUpdateQueue {
    queue: ArrayQueue<UiUpdate>,
    enqueued: AtomicU64,
    dropped: AtomicU64,
}

impl UiUpdateQueue {
    /// Create a queue holding up to `capacity` updates
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            enqueued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue without blocking; returns false if the update was dropped
    pub fn push(&self, update: UiUpdate) -> bool {
        match self.queue.push(update) {
            Ok(()) => {
                self.enqueued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(update) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    "UI queue full, dropped {} update (total dropped: {})",
                    update.kind(),
                    dropped
                );
                false
            }
        }
    }

    /// Take the oldest update, if any
    pub fn pop(&self) -> Option<UiUpdate> {
        self.queue.pop()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of updates waiting
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Maximum number of updates held at once
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Total updates accepted since creation
    pub fn enqueued_count(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Total updates dropped because the queue was full
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Fill ratio from 0.0 (empty) to 1.0 (full)
    pub fn fill_level(&self) -> f32 {
        self.len() as f32 / self.capacity() as f32
    }
}

/// Queue shared between producers and the render loop
pub type SharedUiQueue = Arc<UiUpdateQueue>;

/// Create a shared queue with the given capacity
pub fn create_shared_queue(capacity: usize) -> SharedUiQueue {
    Arc::new(UiUpdateQueue::new(capacity))
}

/// Producer handle with one helper per update kind
///
/// Clones share the queue and the FPS coalescing state.
#[derive(Clone)]
pub struct UiUpdateSender {
    queue: SharedUiQueue,
    last_fps_bits: Arc<AtomicU32>,
    fps_threshold: f32,
}

impl UiUpdateSender {
    /// Create a sender over `queue`
    ///
    /// FPS readings closer than `fps_threshold` to the last one sent are
    /// coalesced.
    pub fn new(queue: SharedUiQueue, fps_threshold: f32) -> Self {
        Self {
            queue,
            last_fps_bits: Arc::new(AtomicU32::new(f32::NAN.to_bits())),
            fps_threshold,
        }
    }

    /// Get the underlying queue
    pub fn queue(&self) -> &SharedUiQueue {
        &self.queue
    }

    /// Enqueue any update; returns false if it was dropped
    pub fn send(&self, update: UiUpdate) -> bool {
        self.queue.push(update)
    }

    /// Link state text and connected flag
    pub fn wifi_status(&self, status: impl Into<String>, connected: bool) -> bool {
        self.send(UiUpdate::WifiStatus {
            status: status.into(),
            connected,
        })
    }

    pub fn network_info(&self, ssid: impl Into<String>, ip: impl Into<String>) -> bool {
        self.send(UiUpdate::NetworkInfo {
            ssid: ssid.into(),
            ip: ip.into(),
        })
    }

    /// Free heap and uptime for the status overlay
    pub fn system_telemetry(&self, free_heap_bytes: u64, uptime_ms: u64) -> bool {
        self.send(UiUpdate::SystemTelemetry {
            free_heap_bytes,
            uptime_ms,
        })
    }

    /// Enqueue an FPS reading unless it is within the threshold of the last
    /// one sent. Returns false when coalesced or dropped.
    pub fn fps(&self, fps: f32) -> bool {
        let last = f32::from_bits(self.last_fps_bits.load(Ordering::Relaxed));
        if !last.is_nan() && (fps - last).abs() < self.fps_threshold {
            return false;
        }
        self.last_fps_bits.store(fps.to_bits(), Ordering::Relaxed);
        self.send(UiUpdate::FpsDisplay { fps })
    }

    /// Default endpoint volume for the Master tab
    pub fn master_volume(&self, volume: f32, muted: bool) -> bool {
        self.send(UiUpdate::MasterVolume { volume, muted })
    }

    pub fn single_volume(&self, volume: f32, muted: bool) -> bool {
        self.send(UiUpdate::SingleVolume { volume, muted })
    }

    /// Both Balance sliders
    pub fn balance_volume(&self, first: f32, second: f32, muted: bool) -> bool {
        self.send(UiUpdate::BalanceVolume {
            first,
            second,
            muted,
        })
    }

    pub fn master_device(&self, label: impl Into<String>) -> bool {
        self.send(UiUpdate::MasterDevice {
            label: label.into(),
        })
    }

    pub fn single_device(&self, label: impl Into<String>) -> bool {
        self.send(UiUpdate::SingleDevice {
            label: label.into(),
        })
    }

    /// Labels of the two Balance sessions
    pub fn balance_devices(&self, first: impl Into<String>, second: impl Into<String>) -> bool {
        self.send(UiUpdate::BalanceDevices {
            first: first.into(),
            second: second.into(),
        })
    }

    /// Ask the overlay to redraw from current values
    pub fn refresh_status_overlay(&self) -> bool {
        self.send(UiUpdate::StatusOverlayRefresh)
    }
}
