use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::sort::SortOrder;
use crate::jobs::{DEFAULT_CLEANUP_INTERVAL, DEFAULT_STALE_AFTER};
use crate::resource::DEFAULT_AUTHORITY;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unable to write config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// User preferences and tuning, stored as `config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sort_order: SortOrder,
    pub authority: String,
    pub cleanup: CleanupConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub interval_secs: u64,
    pub stale_after_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sort_order: SortOrder::Default,
            authority: DEFAULT_AUTHORITY.to_string(),
            cleanup: CleanupConfig::default(),
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_CLEANUP_INTERVAL.as_secs(),
            stale_after_secs: DEFAULT_STALE_AFTER.as_secs(),
        }
    }
}

impl CleanupConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

impl AppConfig {
    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
