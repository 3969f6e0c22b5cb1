// Shared transport configuration for building reqwest::Client instances.
//
// The gateway client keeps two clients built from this config: one for
// ordinary requests and one for long-running hardware sequences.

use std::time::Duration;

use crate::error::Error;

const USER_AGENT: &str = concat!("replifactory/", env!("CARGO_PKG_VERSION"));

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Per-request timeout for ordinary calls.
    pub timeout: Duration,
    /// Timeout for calls that block on a hardware sequence
    /// (pump calibration).
    pub long_running_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            long_running_timeout: Duration::from_secs(600),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` using the ordinary request timeout.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        Self::build_with_timeout(self.timeout)
    }

    /// Build a `reqwest::Client` using the long-running timeout.
    pub fn build_long_running_client(&self) -> Result<reqwest::Client, Error> {
        Self::build_with_timeout(self.long_running_timeout)
    }

    fn build_with_timeout(timeout: Duration) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(Error::Transport)
    }
}
