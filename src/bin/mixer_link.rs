//! Mixer Link host harness
//!
//! Runs the mixer core against newline-delimited JSON frames: inbound frames
//! on stdin, outbound frames on stdout. Logs go to stderr.

use anyhow::Result;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mixer_link::{
    audio::AudioStateManager,
    bridge::MessageBridge,
    clock::{SharedClock, SystemClock},
    config::AppConfig,
    transport::LineTransport,
    ui::{audio_view, create_shared_queue, RenderLoop, UiSink, UiUpdate, UiUpdateSender},
};

/// Request housekeeping cadence
const TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Stats are logged every this many ticks
const STATS_EVERY_TICKS: u64 = 20;

/// Sink standing in for the display: logs each update
struct LogSink;

impl UiSink for LogSink {
    fn apply(&mut self, update: UiUpdate) {
        tracing::info!("UI {}: {:?}", update.kind(), update);
    }
}

/// Forget sessions that are gone and return the ones seen for the first time
///
/// A purged session that comes back is fetched again.
fn sessions_needing_logo(requested: &mut HashSet<String>, names: &[String]) -> Vec<String> {
    requested.retain(|name| names.contains(name));
    names
        .iter()
        .filter(|name| requested.insert((*name).clone()))
        .cloned()
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting Mixer Link");

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(AppConfig::default_path);
    let config = AppConfig::load_or_default(config_path.as_deref());
    tracing::info!("Device ID: {}", config.device.device_id);

    let clock: SharedClock = Arc::new(SystemClock::new());

    // UI queue and render loop
    let queue = create_shared_queue(config.ui.queue_capacity);
    let sender = UiUpdateSender::new(queue.clone(), config.ui.fps_coalesce_threshold);
    let mut render = RenderLoop::new(queue, LogSink, config.ui.max_updates_per_cycle)
        .spawn(Duration::from_millis(config.ui.tick_interval_ms))?;

    // Audio state, wired to the display
    let mut manager = AudioStateManager::new(&config.audio, clock.clone());
    audio_view::attach(&mut manager, sender);
    let audio = manager.into_shared();

    let mut bridge = MessageBridge::new(
        &config,
        audio.clone(),
        LineTransport::new(std::io::stdout()),
        clock,
    );

    bridge.request_status(|result| match result {
        Ok(status) => tracing::info!("Initial status: {} sessions", status.sessions.len()),
        Err(e) => tracing::warn!("Initial status request failed: {}", e),
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    let mut ticks: u64 = 0;
    let mut logos_requested: HashSet<String> = HashSet::new();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        tracing::info!("Input closed");
                        break;
                    }
                    Err(e) => {
                        tracing::error!("Input read failed: {}", e);
                        break;
                    }
                };
                let frame = line.trim();
                if frame.is_empty() {
                    continue;
                }
                if let Err(e) = bridge.handle_frame(frame) {
                    tracing::warn!("Frame rejected: {}", e);
                    continue;
                }

                let names = audio.lock().state().device_names();
                for name in sessions_needing_logo(&mut logos_requested, &names) {
                    let label = name.clone();
                    bridge.request_asset(&name, move |result| match result {
                        Ok(asset) => tracing::info!(
                            "Logo for {}: {}x{} {}",
                            label,
                            asset.width,
                            asset.height,
                            asset.format
                        ),
                        Err(e) => tracing::warn!("Logo for {} unavailable: {}", label, e),
                    });
                }
            }
            _ = ticker.tick() => {
                let expired = bridge.tick();
                if expired > 0 {
                    tracing::warn!("{} requests timed out", expired);
                }

                ticks += 1;
                if ticks % STATS_EVERY_TICKS == 0 {
                    let bridge_stats = bridge.stats();
                    let request_stats = bridge.requests().stats();
                    let render_stats = render.stats();
                    tracing::info!(
                        "Stats: {} frames in ({} ignored, {} rejected), {} frames out, {} requests completed, {} timed out, {} UI updates rendered, {} dropped",
                        bridge_stats.frames_received,
                        bridge_stats.frames_ignored,
                        bridge_stats.frames_rejected,
                        bridge_stats.frames_sent,
                        request_stats.completed,
                        request_stats.timed_out,
                        render_stats.processed,
                        render_stats.queue_dropped
                    );
                    if !bridge.is_peer_active() {
                        tracing::warn!("No traffic from host");
                    }
                }
            }
        }
    }

    bridge.shutdown();
    render.stop();
    tracing::info!("Mixer Link stopped");
    Ok(())
}
