//! Configuration for the feed
//!
//! The core only consumes these values. Loading from a file (and overriding
//! from the command line) is done by the binary.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::actors::transport::ReconnectPolicy;

/// Default config file location below the user's home directory
const DEFAULT_CONFIG_PATH: &str = ".config/guardia/feed.toml";

/// Feed configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// API server URL (also used to derive the stream URL)
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// API authentication token (optional)
    pub api_token: Option<String>,

    /// Delay between reconnect attempts in milliseconds (default: 3000)
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_ms: u64,

    /// Reconnect attempts before giving up (default: 10)
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Inventory poll interval in milliseconds (default: 5000)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Chart time window in seconds (default: 300 = 5 minutes)
    #[serde(default = "default_time_window")]
    pub time_window_seconds: u64,

    /// Points to backfill per newly seen server, 0 disables (default: 0)
    #[serde(default)]
    pub history_backfill_limit: usize,

    /// HTTP request timeout in seconds (default: 10)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_api_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_reconnect_interval() -> u64 {
    3000
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_poll_interval() -> u64 {
    5000
}

fn default_time_window() -> u64 {
    300 // 5 minutes
}

fn default_request_timeout() -> u64 {
    10
}

impl Config {
    /// Load configuration from file, or use defaults if file doesn't exist
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(|p| p.to_path_buf()).or_else(|| {
            let home = dirs::home_dir()?;
            let default_path = home.join(DEFAULT_CONFIG_PATH);
            if default_path.exists() {
                Some(default_path)
            } else {
                None
            }
        });

        let Some(path) = config_path else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
            .inspect(|config: &Config| trace!("loaded config: {config:?}"))
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            interval: Duration::from_millis(self.reconnect_interval_ms),
            max_attempts: self.max_reconnect_attempts,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_token: None,
            reconnect_interval_ms: default_reconnect_interval(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            poll_interval_ms: default_poll_interval(),
            time_window_seconds: default_time_window(),
            history_backfill_limit: 0,
            request_timeout_secs: default_request_timeout(),
        }
    }
}
