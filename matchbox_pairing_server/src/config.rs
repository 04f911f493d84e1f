//! Server configuration

use crate::protocol::Mode;
use chrono::TimeDelta;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming the TOML configuration file
pub const CONFIG_ENV: &str = "MATCHBOX_PAIRING_CONFIG";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Server configuration.
///
/// ```toml
/// snapshot_path = "/tmp/matchbox_pairing_state.json"
/// peer_timeout_secs = 30
/// default_mode = "chat"
/// lock_timeout_ms = 2000
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the state container is kept between requests.
    pub snapshot_path: PathBuf,
    /// Seconds a connection stays reachable after its last request.
    pub peer_timeout_secs: u64,
    /// Mode used when a `find` request names none or an unknown one.
    pub default_mode: Mode,
    /// Milliseconds to wait for another instance to release the snapshot.
    pub lock_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("matchbox_pairing_state.json"),
            peer_timeout_secs: 30,
            default_mode: Mode::Chat,
            lock_timeout_ms: 2000,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load the file named by [`CONFIG_ENV`], or defaults when it is unset
    /// or unreadable.
    pub fn from_env() -> Self {
        let Ok(path) = std::env::var(CONFIG_ENV) else {
            return Self::default();
        };
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!(path = %path, error = %e, "Failed to load config, using defaults");
            Self::default()
        })
    }

    /// Connection lease derived from `peer_timeout_secs`
    pub fn lease(&self) -> TimeDelta {
        let secs = i64::try_from(self.peer_timeout_secs).unwrap_or(i64::MAX);
        TimeDelta::try_seconds(secs).unwrap_or(TimeDelta::MAX)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}
