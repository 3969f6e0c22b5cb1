//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and a stable exit code.

use miette::Diagnostic;
use thiserror::Error;

use replifactory_config::ConfigError;
use replifactory_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const REJECTED: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the backend: {reason}")]
    #[diagnostic(
        code(replifactory::connection_failed),
        help(
            "Check that the proxy and backend are running and reachable.\n\
             Try: replifactory --gateway http://<host>:3000/api host"
        )
    )]
    ConnectionFailed { reason: String },

    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(replifactory::timeout),
        help("Increase the timeout with --timeout, or check that the backend is responsive.")
    )]
    Timeout { seconds: u64 },

    #[error("Notification channel failed: {reason}")]
    #[diagnostic(code(replifactory::notifications))]
    Channel { reason: String },

    // ── Backend answers ──────────────────────────────────────────────
    /// The backend declined the request; `message` is its own text.
    #[error("{message}")]
    #[diagnostic(code(replifactory::rejected))]
    Rejected { message: String },

    #[error("Not found: {message}")]
    #[diagnostic(code(replifactory::not_found))]
    NotFound { message: String },

    #[error("Backend error (HTTP {status}): {message}")]
    #[diagnostic(code(replifactory::api_error))]
    ApiError { status: u16, message: String },

    #[error("Unexpected backend response: {message}")]
    #[diagnostic(
        code(replifactory::decode),
        help("The backend may be a different version than this CLI expects. Re-run with -vv for details.")
    )]
    Decode { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(replifactory::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(replifactory::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: replifactory config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No gateway configured")]
    #[diagnostic(
        code(replifactory::no_config),
        help(
            "Create a profile with: replifactory config init\n\
             Or pass --gateway / set REPLIFACTORY_GATEWAY.\n\
             Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(replifactory::config))]
    Config(Box<ConfigError>),

    // ── Interactive ──────────────────────────────────────────────────
    #[error("'{action}' requires confirmation")]
    #[diagnostic(
        code(replifactory::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(replifactory::json), help("Check the JSON file contents and try again."))]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Channel { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Rejected { .. } => exit_code::REJECTED,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Validation { .. } | Self::NoConfig { .. } | Self::NonInteractiveRequiresYes { .. } => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError ─────────────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { reason } => CliError::ConnectionFailed { reason },
            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },
            CoreError::Channel { reason } => CliError::Channel { reason },
            rejected @ CoreError::Rejected { .. } => CliError::Rejected {
                message: rejected.to_string(),
            },
            CoreError::NotFound { message } => CliError::NotFound { message },
            CoreError::Api { message, status } => CliError::ApiError { status, message },
            CoreError::Decode { message } => CliError::Decode { message },
            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },
            CoreError::Config { message } => CliError::Validation {
                field: "gateway".into(),
                reason: message,
            },
            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

// ── ConfigError → CliError ───────────────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::UnknownProfile { name } => CliError::ProfileNotFound {
                name,
                available: String::new(),
            },
            other => CliError::Config(Box::new(other)),
        }
    }
}

impl From<replifactory_api::Error> for CliError {
    fn from(err: replifactory_api::Error) -> Self {
        CoreError::from(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_keeps_server_text_and_exit_code() {
        let err = CliError::from(CoreError::Rejected {
            message: Some("All valves are closed".into()),
            status: None,
        });
        assert_eq!(err.to_string(), "All valves are closed");
        assert_eq!(err.exit_code(), exit_code::REJECTED);
    }

    #[test]
    fn transport_failures_use_connection_code() {
        let err = CliError::from(CoreError::ConnectionFailed {
            reason: "connection refused".into(),
        });
        assert_eq!(err.exit_code(), exit_code::CONNECTION);

        let err = CliError::from(CoreError::Timeout { timeout_secs: 30 });
        assert_eq!(err.exit_code(), exit_code::TIMEOUT);
    }

    #[test]
    fn validation_is_a_usage_error() {
        let err = CliError::from(CoreError::ValidationFailed {
            message: "vial must be between 1 and 7".into(),
        });
        assert_eq!(err.exit_code(), exit_code::USAGE);
    }
}
