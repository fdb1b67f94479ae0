//! Configuration for the arena server.
//!
//! Loaded from a TOML file when one exists, otherwise defaults apply.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::launcher::LauncherConfig;

/// Default config file location, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "arena.toml";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Listen address settings
    pub server: ServerSettings,
    /// Launcher control call policy
    pub launcher: LauncherSettings,
    /// Battle defaults
    pub battle: BattleSettings,
    /// Live-update stream settings
    pub events: EventSettings,
}

/// Listen address for the management and live-update surfaces
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
}

/// Retry policy for launcher control calls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherSettings {
    /// Attempts per control call, first try included
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles each retry
    pub base_delay_ms: u64,
    /// Per-attempt timeout
    pub call_timeout_secs: u64,
}

/// Battle defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BattleSettings {
    /// Dispatch deadline applied when a submission does not set one
    pub default_timeout_seconds: u64,
}

/// Live-update stream settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSettings {
    /// Per-subscriber delta buffer; a subscriber falling further behind is
    /// lagged and resynchronized with a snapshot
    pub buffer: usize,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            launcher: LauncherSettings::default(),
            battle: BattleSettings::default(),
            events: EventSettings::default(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8360,
        }
    }
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            call_timeout_secs: 10,
        }
    }
}

impl Default for BattleSettings {
    fn default() -> Self {
        Self {
            default_timeout_seconds: 300,
        }
    }
}

impl Default for EventSettings {
    fn default() -> Self {
        Self { buffer: 256 }
    }
}

impl ArenaConfig {
    /// Load from the default path if present, otherwise defaults
    pub fn load() -> Result<Self> {
        let path = Path::new(DEFAULT_CONFIG_PATH);
        if path.exists() {
            Self::load_from_path(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create config directory: {}", parent.display())
                })?;
            }
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    /// Launcher client settings in the form the client consumes
    pub fn launcher_config(&self) -> LauncherConfig {
        LauncherConfig {
            max_attempts: self.launcher.max_attempts,
            base_delay: Duration::from_millis(self.launcher.base_delay_ms),
            call_timeout: Duration::from_secs(self.launcher.call_timeout_secs),
        }
    }
}
