use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AuthError;

pub const LOGIN_REQUIRED_MESSAGE: &str = "Please log in";
pub const EDIT_CONFLICT_MESSAGE: &str =
    "Someone else has changed this item. Reload it and try again.";

/// Severity of a user-visible notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: u64,
    pub kind: NotificationKind,
    pub message: String,
    pub error: Option<AuthError>,
    pub created_at: DateTime<Utc>,
}

/// Toast queue shown by the UI.
///
/// Errors are mapped at the door: a login prompt and an edit conflict get fixed
/// messages, any other error is shown as an error with the caller's message.
pub struct NotificationCenter {
    next_id: AtomicU64,
    notifications: Mutex<Vec<Notification>>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            notifications: Mutex::new(Vec::new()),
        }
    }

    /// Queue a notification and return its id
    pub fn add(
        &self,
        kind: NotificationKind,
        message: impl Into<String>,
        error: Option<AuthError>,
    ) -> u64 {
        let (kind, message) = match &error {
            Some(AuthError::LoginRequired) => {
                (NotificationKind::Info, LOGIN_REQUIRED_MESSAGE.to_string())
            }
            Some(err) if err.is_edit_conflict() => {
                (NotificationKind::Warning, EDIT_CONFLICT_MESSAGE.to_string())
            }
            Some(_) => (NotificationKind::Error, message.into()),
            None => (kind, message.into()),
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(id, ?kind, "Notification added");
        self.lock().push(Notification {
            id,
            kind,
            message,
            error,
            created_at: Utc::now(),
        });
        id
    }

    /// Report a failed operation
    pub fn report(&self, message: impl Into<String>, error: AuthError) -> u64 {
        self.add(NotificationKind::Error, message, Some(error))
    }

    pub fn remove(&self, id: u64) -> bool {
        let mut notifications = self.lock();
        let before = notifications.len();
        notifications.retain(|n| n.id != id);
        notifications.len() != before
    }

    /// All queued notifications, oldest first
    pub fn list(&self) -> Vec<Notification> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Notification>> {
        self.notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}
