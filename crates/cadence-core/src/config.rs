//! Player configuration.
//!
//! JSON on disk, every field optional. A bad file never stops the player:
//! `load_or_default` logs and falls back to defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Env var overriding `poll_interval_ms`.
pub const ENV_POLL_MS: &str = "CADENCE_POLL_MS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Progress poll period while playing.
    pub poll_interval_ms: u64,
    /// Whole-request timeout for remote byte sources. `None` disables it.
    pub fetch_timeout_secs: Option<u64>,
    /// Largest source the byte sources will read into memory.
    pub max_fetch_bytes: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            fetch_timeout_secs: Some(30),
            max_fetch_bytes: 256 * 1024 * 1024,
        }
    }
}

impl PlayerConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: PlayerConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Load from `path`, falling back to defaults when missing or invalid.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => config,
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("cadence: no config at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                log::warn!("cadence: invalid config {}: {}, using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    /// Apply environment overrides. Unparseable values are ignored.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(raw) = std::env::var(ENV_POLL_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => self.poll_interval_ms = ms,
                _ => log::warn!("cadence: ignoring {}={:?}", ENV_POLL_MS, raw),
            }
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be > 0".into()));
        }
        if self.max_fetch_bytes == 0 {
            return Err(ConfigError::Invalid("max_fetch_bytes must be > 0".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_secs.map(Duration::from_secs)
    }
}
