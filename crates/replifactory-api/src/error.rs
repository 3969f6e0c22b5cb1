use thiserror::Error;

/// Top-level error type for the `replifactory-api` crate.
///
/// Every backend response shape is normalized into one of these variants
/// by [`crate::envelope::decode`]. `replifactory-core` maps them into
/// store-level errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Reaching the backend ──
    /// The request never produced a response.
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("bad gateway URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request exceeded the configured timeout.
    #[error("no answer within {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Backend answered with a failure ──
    /// Non-2xx HTTP status. `message` is the server's `detail` / `error` /
    /// `message` text when present, otherwise a body preview.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// 2xx response that declared failure (`success: false`, an `error`
    /// field, or a bare `detail`).
    #[error("Request rejected: {}", message.as_deref().unwrap_or("no message from backend"))]
    Rejected { message: Option<String> },

    // ── Notification socket ──
    #[error("notification socket handshake failed: {0}")]
    WebSocketConnect(String),

    /// The socket closed with an error frame or a read failure.
    #[error("notification socket closed ({code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    // ── Payload ──
    /// The body did not match the expected shape. `body` keeps the raw
    /// text for `-vv` logging.
    #[error("unexpected response body: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Worth retrying by hand: connection trouble, timeouts, 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } | Self::WebSocketConnect(_) => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// The message the backend attached to a failure, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Http { message, .. } => Some(message),
            Self::Rejected { message } => message.as_deref(),
            _ => None,
        }
    }

    /// HTTP status associated with this error, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
