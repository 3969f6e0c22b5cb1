// ── Controller facade ──
//
// Owns one gateway client and hands it to every store. Front-ends hold a
// `Controller` and reach stores through it; stores never talk to each
// other.

use std::sync::Arc;

use replifactory_api::GatewayClient;
use replifactory_api::websocket::ws_url;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::GatewayConfig;
use crate::error::CoreError;
use crate::notify::NotificationChannel;
use crate::store::{DeviceStore, ExperimentStore, HostStore};

/// Entry point for consumers. Cheaply cloneable.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: GatewayConfig,
    devices: DeviceStore,
    experiments: ExperimentStore,
    host: HostStore,
    notifications: NotificationChannel,
    cancel: CancellationToken,
}

impl Controller {
    /// Build the stores for the gateway described by `config`. No request
    /// is sent until an action runs.
    pub fn new(config: GatewayConfig) -> Result<Self, CoreError> {
        let api = GatewayClient::new(config.url.clone(), &config.transport())?;
        Self::with_client(config, api)
    }

    /// Build on an existing gateway client.
    pub fn with_client(config: GatewayConfig, api: GatewayClient) -> Result<Self, CoreError> {
        let cancel = CancellationToken::new();
        let ws = ws_url(api.base_url())?;
        debug!(gateway = %api.base_url(), notifications = %ws, "controller ready");
        let notifications =
            NotificationChannel::new(ws, config.notification_capacity, cancel.child_token());

        Ok(Self {
            inner: Arc::new(ControllerInner {
                devices: DeviceStore::new(api.clone()),
                experiments: ExperimentStore::new(api.clone()),
                host: HostStore::new(api),
                notifications,
                cancel,
                config,
            }),
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    pub fn devices(&self) -> &DeviceStore {
        &self.inner.devices
    }

    pub fn experiments(&self) -> &ExperimentStore {
        &self.inner.experiments
    }

    pub fn host(&self) -> &HostStore {
        &self.inner.host
    }

    pub fn notifications(&self) -> &NotificationChannel {
        &self.inner.notifications
    }

    /// Stop background work (the notification reader).
    pub fn shutdown(&self) {
        self.inner.notifications.disconnect();
        self.inner.cancel.cancel();
    }
}
