// ── Host store ──

use tokio::sync::watch;
use tracing::warn;

use replifactory_api::GatewayClient;

use crate::error::CoreError;

/// Display name of the machine running the backend.
pub struct HostStore {
    api: GatewayClient,
    hostname: watch::Sender<Option<String>>,
    error_message: watch::Sender<Option<String>>,
}

impl HostStore {
    pub(crate) fn new(api: GatewayClient) -> Self {
        let (hostname, _) = watch::channel(None);
        let (error_message, _) = watch::channel(None);
        Self {
            api,
            hostname,
            error_message,
        }
    }

    pub fn hostname(&self) -> Option<String> {
        self.hostname.borrow().clone()
    }

    pub fn error_message(&self) -> Option<String> {
        self.error_message.borrow().clone()
    }

    pub async fn fetch_hostname(&self) -> Result<String, CoreError> {
        match self.api.hostname().await {
            Ok(name) => {
                self.hostname.send_replace(Some(name.clone()));
                Ok(name)
            }
            Err(e) => {
                warn!(error = %e, "hostname fetch failed");
                self.error_message
                    .send_replace(Some("Failed to fetch hostname.".into()));
                Err(e.into())
            }
        }
    }
}
