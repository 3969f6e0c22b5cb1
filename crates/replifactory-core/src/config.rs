// ── Runtime gateway configuration ──
//
// Describes *where* the backend lives and how patient to be with it.
// The CLI builds a `GatewayConfig` from its profile and hands it in;
// core never reads config files.

use std::time::Duration;

use replifactory_api::TransportConfig;
use url::Url;

/// Default notification log capacity (progress and toast logs each).
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 500;

/// Configuration for talking to one backend gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// API base URL, e.g. `http://localhost:3000/api`.
    pub url: Url,
    /// Timeout for ordinary requests.
    pub timeout: Duration,
    /// Timeout for requests that block on a hardware sequence.
    pub long_running_timeout: Duration,
    /// Bound on each notification log before the oldest entry is evicted.
    pub notification_capacity: usize,
}

impl GatewayConfig {
    /// Gateway at `url` with default timeouts and log capacity.
    pub fn new(url: Url) -> Self {
        let transport = TransportConfig::default();
        Self {
            url,
            timeout: transport.timeout,
            long_running_timeout: transport.long_running_timeout,
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
        }
    }

    pub(crate) fn transport(&self) -> TransportConfig {
        TransportConfig {
            timeout: self.timeout,
            long_running_timeout: self.long_running_timeout,
        }
    }
}
