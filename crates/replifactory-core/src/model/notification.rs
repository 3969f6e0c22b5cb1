// ── Notification events ──

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use replifactory_api::websocket::NotificationKind;

/// A toast-style message pushed by the backend. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationEvent {
    pub kind: NotificationKind,
    pub message: String,
    pub received_at: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn new(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            received_at: Utc::now(),
        }
    }
}
