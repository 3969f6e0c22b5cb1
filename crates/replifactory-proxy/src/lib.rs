// replifactory-proxy: GUI host, API reverse proxy and tunnel supervisor
//
// One axum router serves three surfaces: the built GUI from disk, the
// backend API under a configurable prefix (HTTP and the notification
// WebSocket), and the `/tunnels` operator endpoints driving the tunnel
// child process.

pub mod error;
pub mod forward;
pub mod operator;
pub mod publish;
pub mod settings;
pub mod tunnel;
pub mod ws;

use std::sync::Arc;

use axum::Router;
use axum::routing::{any, get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use url::Url;

use replifactory_api::{GatewayClient, TransportConfig};

pub use error::ProxyError;
pub use publish::{LogPublisher, UrlPublisher, WebhookPublisher};
pub use settings::{ProxyArgs, Settings};
pub use tunnel::TunnelManager;

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub http: reqwest::Client,
    pub backend_ws: Url,
    pub tunnel: TunnelManager,
}

/// Upstream client: no overall timeout beyond the backend's longest
/// call, and bodies pass through without decompression.
fn upstream_client() -> Result<reqwest::Client, ProxyError> {
    let transport = TransportConfig::default();
    reqwest::Client::builder()
        .timeout(transport.long_running_timeout)
        .connect_timeout(transport.timeout)
        .no_gzip()
        .no_brotli()
        .build()
        .map_err(|e| ProxyError::Settings {
            field: "http".into(),
            reason: e.to_string(),
        })
}

impl AppState {
    /// Build state with the publisher implied by `settings`.
    pub fn new(settings: Settings) -> Result<Self, ProxyError> {
        let http = upstream_client()?;
        let publisher: Arc<dyn UrlPublisher> = match settings.publish_webhook {
            Some(ref endpoint) => Arc::new(WebhookPublisher::new(http.clone(), endpoint.clone())),
            None => Arc::new(LogPublisher),
        };
        let host = GatewayClient::with_client(http.clone(), settings.backend.clone());
        let tunnel = TunnelManager::new(
            settings.tunnel.clone(),
            settings.port,
            publisher,
            Some(host),
        );
        Self::with_tunnel(settings, http, tunnel)
    }

    /// Build state around an existing tunnel manager.
    pub fn with_tunnel(
        settings: Settings,
        http: reqwest::Client,
        tunnel: TunnelManager,
    ) -> Result<Self, ProxyError> {
        let backend_ws = replifactory_api::websocket::ws_url(&settings.backend).map_err(|e| {
            ProxyError::Settings {
                field: "backend".into(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            settings: Arc::new(settings),
            http,
            backend_ws,
            tunnel,
        })
    }
}

/// Assemble the full router.
pub fn build_router(state: AppState) -> Router {
    let prefix = state.settings.prefix.clone();
    let static_dir = state.settings.static_dir.clone();
    let gui = ServeDir::new(&static_dir).fallback(ServeFile::new(static_dir.join("index.html")));

    Router::new()
        .route("/tunnels/set-authtoken", post(operator::set_authtoken))
        .route("/tunnels/start", post(operator::start))
        .route("/tunnels/stop", post(operator::stop))
        .route("/tunnels/get-url", get(operator::get_url))
        .route(&format!("{prefix}/ws"), get(ws::bridge))
        .route(&prefix, any(forward::forward))
        .route(&format!("{prefix}/"), any(forward::forward))
        .route(&format!("{prefix}/{{*rest}}"), any(forward::forward))
        .fallback_service(gui)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `cancel` fires, running the tunnel monitor alongside.
pub async fn serve(
    state: AppState,
    listener: TcpListener,
    cancel: CancellationToken,
) -> Result<(), ProxyError> {
    let monitor = state
        .tunnel
        .spawn_monitor(state.settings.tunnel_poll, cancel.child_token());

    info!(
        addr = %listener.local_addr()?,
        backend = %state.settings.backend,
        prefix = %state.settings.prefix,
        static_dir = %state.settings.static_dir.display(),
        "proxy listening"
    );

    let shutdown = cancel.clone();
    let served = axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await;

    cancel.cancel();
    if let Err(e) = monitor.await {
        warn!(error = %e, "tunnel monitor task failed");
    }
    Ok(served?)
}
