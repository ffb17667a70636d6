//! Session timing configuration.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::protocol::constants::*;

/// Timeouts and retry policy for a device session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Timeout for file-send transfers and their status polls.
    pub transfer_timeout_ms: u64,
    /// Timeout for uploads, commands, exploit and raw requests.
    pub short_timeout_ms: u64,
    /// Console bulk read timeout.
    pub console_timeout_ms: u64,
    /// Status polls per packet during file-send (first poll included).
    pub status_retry_attempts: u32,
    /// Pause between status polls.
    pub status_retry_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            transfer_timeout_ms: USB_TIMEOUT_MS,
            short_timeout_ms: SHORT_TIMEOUT_MS,
            console_timeout_ms: CONSOLE_TIMEOUT_MS,
            status_retry_attempts: STATUS_RETRY_ATTEMPTS,
            status_retry_interval_ms: STATUS_RETRY_INTERVAL_MS,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_millis(self.transfer_timeout_ms)
    }

    pub fn short_timeout(&self) -> Duration {
        Duration::from_millis(self.short_timeout_ms)
    }

    pub fn console_timeout(&self) -> Duration {
        Duration::from_millis(self.console_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.status_retry_attempts.max(1),
            interval: Duration::from_millis(self.status_retry_interval_ms),
        }
    }
}

/// Bounded status polling: `attempts` polls, `interval` apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval: Duration,
}
