use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Errors surfaced by proxy handlers and the tunnel supervisor.
///
/// Every variant renders as `{"error": "..."}` so the GUI can show it
/// the same way it shows backend failures.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("backend unreachable: {0}")]
    Backend(#[source] reqwest::Error),

    #[error("request body rejected: {0}")]
    Body(String),

    #[error("no tunnel auth token configured")]
    MissingToken,

    #[error("tunnel failed: {message}")]
    Tunnel { message: String },

    #[error("publish failed: {0}")]
    Publish(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid setting {field}: {reason}")]
    Settings { field: String, reason: String },
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Backend(_) => StatusCode::BAD_GATEWAY,
            Self::Body(_) => StatusCode::BAD_REQUEST,
            Self::MissingToken
            | Self::Tunnel { .. }
            | Self::Publish(_)
            | Self::Io(_)
            | Self::Settings { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
