//! Runtime configuration
//!
//! Loaded from TOML. Every section and field is optional; missing values
//! fall back to the firmware defaults.

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::audio::state::TabState;
use crate::constants;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub device: DeviceConfig,
    pub protocol: ProtocolConfig,
    pub audio: AudioConfig,
    pub requests: RequestConfig,
    pub ui: UiConfig,
}

/// Identity used for loopback filtering and outbound envelopes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub device_id: String,
    pub device_type: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_id: constants::DEVICE_ID.to_string(),
            device_type: constants::DEVICE_TYPE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Ceiling for a single serialized frame, in bytes
    pub max_payload_size: usize,
    /// Characters of a frame kept when logging it
    pub log_truncate_length: usize,
    /// Peer considered idle after this long without traffic
    pub activity_timeout_ms: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_payload_size: constants::MAX_PAYLOAD_SIZE,
            log_truncate_length: constants::LOG_TRUNCATE_LENGTH,
            activity_timeout_ms: constants::ACTIVITY_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Snapshots a stale session survives before it is purged
    pub stale_grace_snapshots: u32,
    pub initial_tab: TabState,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            stale_grace_snapshots: constants::STALE_GRACE_SNAPSHOTS,
            initial_tab: TabState::Master,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_concurrent: usize,
    pub max_queued: usize,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: constants::REQUEST_TIMEOUT_MS,
            max_concurrent: constants::MAX_CONCURRENT_REQUESTS,
            max_queued: constants::MAX_QUEUED_REQUESTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub queue_capacity: usize,
    pub max_updates_per_cycle: usize,
    pub tick_interval_ms: u64,
    /// FPS changes smaller than this are not enqueued
    pub fps_coalesce_threshold: f32,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            queue_capacity: constants::UI_QUEUE_CAPACITY,
            max_updates_per_cycle: constants::UI_MAX_UPDATES_PER_CYCLE,
            tick_interval_ms: constants::UI_TICK_INTERVAL_MS,
            fps_coalesce_threshold: 0.5,
        }
    }
}

impl AppConfig {
    /// Platform config location, e.g. `~/.config/mixer-link/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "mixer-link").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise defaults
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        if !path.exists() {
            tracing::info!("No config at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => {
                tracing::info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                tracing::warn!("Ignoring config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.device.device_id.trim().is_empty() {
            return Err(Error::Config("device.device_id must not be empty".into()));
        }
        if self.protocol.max_payload_size == 0 {
            return Err(Error::Config("protocol.max_payload_size must be > 0".into()));
        }
        if self.requests.max_concurrent == 0 {
            return Err(Error::Config("requests.max_concurrent must be > 0".into()));
        }
        if self.ui.queue_capacity == 0 || self.ui.max_updates_per_cycle == 0 {
            return Err(Error::Config(
                "ui.queue_capacity and ui.max_updates_per_cycle must be > 0".into(),
            ));
        }
        if self.ui.tick_interval_ms == 0 {
            return Err(Error::Config("ui.tick_interval_ms must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_firmware() {
        let config = AppConfig::default();
        assert_eq!(config.device.device_id, "ESP32S3-CONTROL-CENTER");
        assert_eq!(config.protocol.max_payload_size, 2048);
        assert_eq!(config.requests.max_concurrent, 1);
        assert_eq!(config.ui.queue_capacity, 32);
        assert_eq!(config.ui.max_updates_per_cycle, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [device]
            device_id = "BENCH-UNIT"

            [ui]
            max_updates_per_cycle = 5

            [audio]
            initial_tab = "Balance"
            "#,
        )
        .unwrap();

        assert_eq!(config.device.device_id, "BENCH-UNIT");
        assert_eq!(config.ui.max_updates_per_cycle, 5);
        assert_eq!(config.ui.queue_capacity, 32);
        assert_eq!(config.audio.initial_tab, TabState::Balance);
        assert_eq!(config.requests.timeout_ms, 30_000);
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = AppConfig::default();
        config.requests.max_concurrent = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = AppConfig::default();
        config.ui.queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir()
            .join(format!("mixer-link-{}", uuid::Uuid::new_v4()))
            .join("config.toml");

        let mut config = AppConfig::default();
        config.audio.stale_grace_snapshots = 4;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("mixer-link-does-not-exist.toml");
        assert_eq!(
            AppConfig::load_or_default(Some(&path)),
            AppConfig::default()
        );
    }
}
