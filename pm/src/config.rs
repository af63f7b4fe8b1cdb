//! Portamon configuration types and loading

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::instance::MAX_INSTANCES;
use crate::quantity::Mode;
use crate::shm::validate_prefix;

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Prefix of every shared segment name; all cooperating instances must agree
    pub segment_prefix: String,

    /// Interval between axis syncs with peers
    pub refresh_interval_ms: u64,

    /// Retry interval while waiting on peers (segment creation and barriers)
    pub poll_interval_ms: u64,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub log_level: Option<String>,

    /// Point colour as [r, g, b]
    pub color: [u8; 3],

    /// Mode active at startup
    pub mode: Mode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            segment_prefix: "/portamon".to_string(),
            refresh_interval_ms: 200,
            poll_interval_ms: 100,
            log_level: None,
            color: [255, 0, 0],
            mode: Mode::Count,
        }
    }
}

impl Config {
    /// Validate configuration before use
    pub fn validate(&self) -> Result<()> {
        if self.refresh_interval_ms == 0 {
            return Err(eyre::eyre!("refresh-interval-ms must be greater than zero"));
        }
        if self.poll_interval_ms == 0 {
            return Err(eyre::eyre!("poll-interval-ms must be greater than zero"));
        }
        validate_prefix(&self.segment_prefix, MAX_INSTANCES - 1).context("Invalid segment-prefix")?;
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: portamon.yml
        let local_config = PathBuf::from("portamon.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/portamon/portamon.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("portamon").join("portamon.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read just the log level, before logging is set up; any failure yields `None`
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load(config_path).ok().and_then(|config| config.log_level)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}
