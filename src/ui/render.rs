//! Render loop consuming the UI update queue
//!
//! Runs on the context that owns the widgets. Each tick applies at most
//! `max_per_cycle` updates in FIFO order; the remainder waits for the next
//! tick. A tick that finds a render in progress does nothing.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::ui::queue::{SharedUiQueue, UiUpdate};

/// Widget-side consumer of UI updates
pub trait UiSink: Send {
    /// Apply one update to the widgets
    fn apply(&mut self, update: UiUpdate);

    /// True while the widget tree is being rebuilt
    fn is_rendering(&self) -> bool {
        false
    }
}

#[derive(Debug, Default)]
struct RenderCounters {
    cycles: AtomicU64,
    processed: AtomicU64,
    skipped: AtomicU64,
    deferred: AtomicU64,
}

/// Render loop statistics
#[derive(Debug, Clone, PartialEq)]
pub struct RenderStats {
    pub cycles: u64,
    /// Updates applied
    pub processed: u64,
    /// Ticks skipped because a render was in progress
    pub skipped: u64,
    /// Ticks that left updates for the next cycle
    pub deferred: u64,
    pub queue_dropped: u64,
}

/// Drains the UI queue into a [`UiSink`] a bounded batch at a time
pub struct RenderLoop<S: UiSink> {
    queue: SharedUiQueue,
    sink: S,
    max_per_cycle: usize,
    counters: Arc<RenderCounters>,
}

impl<S: UiSink> RenderLoop<S> {
    /// Create a loop draining `queue` into `sink`, at most `max_per_cycle`
    /// updates per tick (minimum one)
    pub fn new(queue: SharedUiQueue, sink: S, max_per_cycle: usize) -> Self {
        Self {
            queue,
            sink,
            max_per_cycle: max_per_cycle.max(1),
            counters: Arc::new(RenderCounters::default()),
        }
    }

    /// Run one cycle; returns the number of updates applied
    pub fn tick(&mut self) -> usize {
        self.counters.cycles.fetch_add(1, Ordering::Relaxed);

        if self.sink.is_rendering() {
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            return 0;
        }

        let mut applied = 0;
        while applied < self.max_per_cycle {
            let Some(update) = self.queue.pop() else {
                break;
            };
            self.sink.apply(update);
            applied += 1;
        }

        self.counters
            .processed
            .fetch_add(applied as u64, Ordering::Relaxed);
        if !self.queue.is_empty() {
            self.counters.deferred.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("{} UI updates deferred to next cycle", self.queue.len());
        }
        applied
    }

    /// Get the sink
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Get the sink mutably
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Get loop statistics
    pub fn stats(&self) -> RenderStats {
        snapshot(&self.counters, &self.queue)
    }
}

impl<S: UiSink + 'static> RenderLoop<S> {
    /// Move the loop onto its own thread, ticking every `interval`
    pub fn spawn(mut self, interval: Duration) -> std::io::Result<RenderHandle> {
        let running = Arc::new(AtomicBool::new(true));
        let running_for_loop = running.clone();
        let counters = self.counters.clone();
        let queue = self.queue.clone();

        let handle = thread::Builder::new()
            .name("ui-render".to_string())
            .spawn(move || {
                tracing::info!("Render loop started ({:?} tick)", interval);
                while running_for_loop.load(Ordering::Relaxed) {
                    self.tick();
                    thread::sleep(interval);
                }
                tracing::info!("Render loop stopped");
            })?;

        Ok(RenderHandle {
            running,
            counters,
            queue,
            thread_handle: Some(handle),
        })
    }
}

fn snapshot(counters: &RenderCounters, queue: &SharedUiQueue) -> RenderStats {
    RenderStats {
        cycles: counters.cycles.load(Ordering::Relaxed),
        processed: counters.processed.load(Ordering::Relaxed),
        skipped: counters.skipped.load(Ordering::Relaxed),
        deferred: counters.deferred.load(Ordering::Relaxed),
        queue_dropped: queue.dropped_count(),
    }
}

/// Handle to a render loop running on its own thread
pub struct RenderHandle {
    running: Arc<AtomicBool>,
    counters: Arc<RenderCounters>,
    queue: SharedUiQueue,
    thread_handle: Option<JoinHandle<()>>,
}

impl RenderHandle {
    /// Check if the render thread is still running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get loop statistics from outside the render thread
    pub fn stats(&self) -> RenderStats {
        snapshot(&self.counters, &self.queue)
    }

    /// Stop the loop and wait for its thread to exit
    ///
    /// Calling this more than once is harmless.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RenderHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
