//! User-facing notices raised by store operations.

use tokio::sync::broadcast;

use crate::error::{ApiError, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub kind: Option<ErrorKind>,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            kind: None,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            kind: None,
            message: message.into(),
        }
    }

    /// Builds the notice shown when `action` (e.g. "update task") fails.
    pub fn from_error(action: &str, err: &ApiError) -> Self {
        let kind = err.kind();
        let message = match kind {
            ErrorKind::Forbidden => format!("You don't have permission to {action}"),
            ErrorKind::Unauthorized => "Your session has expired. Please sign in again.".to_string(),
            ErrorKind::Validation => err.message().to_string(),
            ErrorKind::NotFound => format!("Failed to {action}: it no longer exists"),
            ErrorKind::Network => format!("Failed to {action}: the server is unreachable"),
            _ => format!("Failed to {action}"),
        };
        Self {
            level: NoticeLevel::Error,
            kind: Some(kind),
            message,
        }
    }

    /// The session must be re-established before anything else will work.
    pub fn requires_reauth(&self) -> bool {
        self.kind == Some(ErrorKind::Unauthorized)
    }
}

#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notice>,
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }

    pub fn notify(&self, notice: Notice) {
        // No subscribers is fine; notices are fire-and-forget.
        let _ = self.tx.send(notice);
    }

    pub fn error(&self, action: &str, err: &ApiError) {
        tracing::warn!(action, error = %err, "operation failed");
        self.notify(Notice::from_error(action, err));
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
