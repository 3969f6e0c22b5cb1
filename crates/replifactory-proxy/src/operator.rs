//! Tunnel operator endpoints under `/tunnels`.

use axum::Json;
use axum::extract::State;
use secrecy::SecretString;

use replifactory_api::models::{
    AuthTokenRequest, AuthTokenResponse, TunnelStatus, TunnelUrlResponse,
};

use crate::AppState;
use crate::error::ProxyError;

/// `POST /tunnels/set-authtoken`
pub async fn set_authtoken(
    State(state): State<AppState>,
    Json(req): Json<AuthTokenRequest>,
) -> Result<Json<AuthTokenResponse>, ProxyError> {
    let status = state
        .tunnel
        .set_token(SecretString::from(req.authtoken))
        .await?;
    Ok(Json(AuthTokenResponse {
        message: "Tunnel authtoken set successfully".into(),
        tunnel_url: status.tunnel_url,
    }))
}

/// `POST /tunnels/start`
pub async fn start(State(state): State<AppState>) -> Result<Json<TunnelStatus>, ProxyError> {
    Ok(Json(state.tunnel.start().await?))
}

/// `POST /tunnels/stop`
pub async fn stop(State(state): State<AppState>) -> Json<TunnelStatus> {
    Json(state.tunnel.stop().await)
}

/// `GET /tunnels/get-url`
pub async fn get_url(State(state): State<AppState>) -> Json<TunnelUrlResponse> {
    let status = state.tunnel.status().await;
    Json(TunnelUrlResponse {
        tunnel_url: status.tunnel_url,
    })
}
