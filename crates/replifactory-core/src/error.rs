// ── Core error types ──
//
// Store-level errors. The `From<replifactory_api::Error>` impl folds the
// gateway's transport and response-shape failures into three families:
// the backend could not be reached, the backend declared failure, or the
// backend answered with something unexpected.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach backend: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Backend request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Declared failures ────────────────────────────────────────────
    /// The backend answered and said no: `success: false`, an `error`
    /// field, or a 4xx with `detail`. `message` is the server's text,
    /// verbatim.
    #[error("{}", message.as_deref().unwrap_or("Request rejected by backend"))]
    Rejected {
        message: Option<String>,
        status: Option<u16>,
    },

    #[error("Not found: {message}")]
    NotFound { message: String },

    // ── Backend faults ───────────────────────────────────────────────
    #[error("Backend error (HTTP {status}): {message}")]
    Api { message: String, status: u16 },

    #[error("Unexpected backend response: {message}")]
    Decode { message: String },

    // ── Client-side errors ───────────────────────────────────────────
    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Notification channel error: {reason}")]
    Channel { reason: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// The backend's own message for a declared failure, if it sent one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Rejected { message, .. } => message.as_deref(),
            Self::NotFound { message } | Self::Api { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Fold a gateway error for calls whose every refusal is shown as-is:
    /// any HTTP status with a body becomes [`CoreError::Rejected`] with the
    /// server's text untouched.
    pub fn rejection(err: replifactory_api::Error) -> Self {
        match err {
            replifactory_api::Error::Http { status, message } => Self::Rejected {
                message: Some(message),
                status: Some(status),
            },
            other => Self::from(other),
        }
    }

    /// `true` when the backend was never reached (or never answered).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. } | Self::Timeout { .. } | Self::Channel { .. }
        )
    }
}

// ── Conversion from gateway errors ───────────────────────────────────

impl From<replifactory_api::Error> for CoreError {
    fn from(err: replifactory_api::Error) -> Self {
        use replifactory_api::Error as ApiError;

        match err {
            ApiError::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else {
                    CoreError::ConnectionFailed {
                        reason: e.to_string(),
                    }
                }
            }
            ApiError::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            ApiError::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            ApiError::Http {
                status: 404,
                message,
            } => CoreError::NotFound { message },
            ApiError::Http { status, message } if (400..500).contains(&status) => {
                CoreError::Rejected {
                    message: Some(message),
                    status: Some(status),
                }
            }
            ApiError::Http { status, message } => CoreError::Api { message, status },
            ApiError::Rejected { message } => CoreError::Rejected {
                message,
                status: None,
            },
            ApiError::WebSocketConnect(reason) => CoreError::Channel { reason },
            ApiError::WebSocketClosed { code, reason } => CoreError::Channel {
                reason: format!("closed (code {code}): {reason}"),
            },
            ApiError::Deserialization { message, body: _ } => CoreError::Decode { message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replifactory_api::Error as ApiError;

    #[test]
    fn client_errors_become_rejections_with_detail() {
        let err = CoreError::from(ApiError::Http {
            status: 400,
            message: "Experiment is already running".into(),
        });
        assert!(matches!(err, CoreError::Rejected { status: Some(400), .. }));
        assert_eq!(err.to_string(), "Experiment is already running");
    }

    #[test]
    fn server_errors_stay_api_errors() {
        let err = CoreError::from(ApiError::Http {
            status: 500,
            message: "boom".into(),
        });
        assert!(matches!(err, CoreError::Api { status: 500, .. }));
        assert_eq!(err.server_message(), Some("boom"));
    }

    #[test]
    fn rejection_keeps_any_status_verbatim() {
        for status in [404, 500] {
            let err = CoreError::rejection(ApiError::Http {
                status,
                message: "No experiment selected".into(),
            });
            assert!(matches!(err, CoreError::Rejected { status: Some(s), .. } if s == status));
            assert_eq!(err.to_string(), "No experiment selected");
        }
        let err = CoreError::rejection(ApiError::Timeout { timeout_secs: 3 });
        assert!(matches!(err, CoreError::Timeout { timeout_secs: 3 }));
    }

    #[test]
    fn bare_rejection_has_generic_display() {
        let err = CoreError::from(ApiError::Rejected { message: None });
        assert_eq!(err.to_string(), "Request rejected by backend");
        assert!(err.server_message().is_none());
    }
}
