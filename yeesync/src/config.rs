//! Configuration for the yeesync console.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use yeesync_core::yeelight::DEFAULT_PORT;
use yeesync_core::{SessionConfig, Smoothing, SyncConfig, YeelightLocator};

/// Address tried when discovery finds nothing.
pub const DEFAULT_FALLBACK_ADDRESS: &str = "192.168.0.213";

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct YeesyncConfig {
    /// Bulb addressing and timeouts.
    pub device: DeviceConfig,
    /// Initial ambient sync settings.
    pub sync: SyncSettings,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Device configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Used when discovery finds nothing. Leaving the key out of a
    /// `[device]` table, or setting it to `""`, disables the fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_address: Option<String>,
    /// Control port assumed for bare IP addresses.
    pub port: u16,
    /// How long each discovery attempt listens, in milliseconds.
    pub discovery_timeout_ms: u64,
    /// Connect and reply deadline, in milliseconds.
    pub request_timeout_ms: u64,
}

/// Sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Screen name or part of it; empty selects the primary screen.
    pub screen: String,
    /// Brightness ceiling in percent.
    pub brightness: u8,
    /// Transition per write in milliseconds; 0 or less is instant.
    pub smooth_ms: i64,
    /// Target frames per second.
    pub fps: u32,
    /// Sample every n-th pixel.
    pub sample_step: u32,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            fallback_address: Some(DEFAULT_FALLBACK_ADDRESS.into()),
            port: DEFAULT_PORT,
            discovery_timeout_ms: 1000,
            request_timeout_ms: 5000,
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        let sync = SyncConfig::default();
        Self {
            screen: sync.screen,
            brightness: sync.brightness,
            smooth_ms: i64::from(sync.smoothing.as_millis()),
            fps: sync.fps,
            sample_step: sync.sample_step,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".into() }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl YeesyncConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Session settings, with `fallback` overriding the configured
    /// fallback address when given.
    pub fn to_session_config(&self, fallback: Option<&str>) -> SessionConfig {
        let fallback = fallback
            .or(self.device.fallback_address.as_deref())
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string);

        SessionConfig {
            fallback_address: fallback,
            sync: SyncConfig {
                screen: self.sync.screen.clone(),
                brightness: self.sync.brightness.clamp(1, 100),
                smoothing: Smoothing::from_millis(self.sync.smooth_ms),
                fps: self.sync.fps.max(1),
                sample_step: self.sync.sample_step.max(1),
            },
        }
    }

    pub fn to_locator(&self) -> YeelightLocator {
        YeelightLocator {
            port: self.device.port,
            discovery_timeout: Duration::from_millis(self.device.discovery_timeout_ms),
            request_timeout: Duration::from_millis(self.device.request_timeout_ms),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
