//! HTTP forwarding of `{prefix}/*` to the backend.

use axum::body::{self, Body};
use axum::extract::{Request, State};
use axum::http::header::HeaderName;
use axum::http::{HeaderMap, Uri};
use axum::response::{IntoResponse, Response};
use tracing::debug;
use url::Url;

use crate::AppState;
use crate::error::ProxyError;

/// Largest request body accepted for forwarding.
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Headers that describe one connection rather than the message.
pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    let name = name.as_str();
    matches!(
        name,
        "connection" | "keep-alive" | "te" | "trailer" | "transfer-encoding" | "upgrade" | "host"
    ) || name.starts_with("proxy-")
}

fn end_to_end(headers: &HeaderMap) -> HeaderMap {
    headers
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Backend URL for `uri` with `prefix` removed from its path.
pub fn target_url(backend: &Url, prefix: &str, uri: &Uri) -> Url {
    let path = uri.path();
    let rest = path.strip_prefix(prefix).unwrap_or(path);
    let rest = rest.trim_start_matches('/');

    let mut target = backend.clone();
    let base = backend.path().trim_end_matches('/');
    target.set_path(&format!("{base}/{rest}"));
    target.set_query(uri.query());
    target
}

pub async fn forward(State(state): State<AppState>, req: Request) -> Result<Response, ProxyError> {
    let (parts, body) = req.into_parts();
    let target = target_url(&state.settings.backend, &state.settings.prefix, &parts.uri);
    let body = body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ProxyError::Body(e.to_string()))?;

    debug!(method = %parts.method, %target, bytes = body.len(), "forwarding");
    let upstream = state
        .http
        .request(parts.method, target)
        .headers(end_to_end(&parts.headers))
        .body(body)
        .send()
        .await
        .map_err(ProxyError::Backend)?;

    let status = upstream.status();
    let headers = end_to_end(upstream.headers());
    let bytes = upstream.bytes().await.map_err(ProxyError::Backend)?;

    Ok((status, headers, Body::from(bytes)).into_response())
}
