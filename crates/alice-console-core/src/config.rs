//! Console configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the console core.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsoleConfig {
    /// Base URL of the agent server (e.g., "http://localhost:8000").
    #[serde(default = "ConsoleConfig::default_base_url")]
    pub base_url: String,

    /// TCP connect timeout in seconds.
    #[serde(default = "ConsoleConfig::default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Sidebar status polling interval in seconds.
    #[serde(default = "ConsoleConfig::default_status_poll")]
    pub status_poll_seconds: u64,

    /// Maximum number of diagnostics kept.
    #[serde(default = "ConsoleConfig::default_diagnostics_capacity")]
    pub diagnostics_capacity: usize,
}

impl ConsoleConfig {
    fn default_base_url() -> String {
        "http://localhost:8000".to_string()
    }

    const fn default_connect_timeout() -> u64 {
        5
    }

    const fn default_status_poll() -> u64 {
        5
    }

    const fn default_diagnostics_capacity() -> usize {
        256
    }

    /// Get the connect timeout as a `Duration`.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Get the status polling interval as a `Duration`. Never zero.
    #[must_use]
    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_secs(self.status_poll_seconds.max(1))
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            connect_timeout_seconds: Self::default_connect_timeout(),
            status_poll_seconds: Self::default_status_poll(),
            diagnostics_capacity: Self::default_diagnostics_capacity(),
        }
    }
}
