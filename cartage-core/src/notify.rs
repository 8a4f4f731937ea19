use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    Low,
    Normal,
    High,
}

/// A client-facing notification record, stored in the document schema's
/// camelCase form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub recipient_id: String,
    /// Machine-readable kind, e.g. "delivery_delivered".
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub delivery_id: Option<String>,
    pub status: Option<String>,
    pub action_required: bool,
    pub priority: NotificationPriority,
    pub is_read: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification dispatch failed: {0}")]
    Dispatch(String),
}

/// Fire-and-forget notification delivery. Callers treat failures as
/// non-fatal and must not let them abort the triggering operation.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn create(&self, notification: Notification) -> Result<(), NotifyError>;
}
