use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use cartage_core::notify::{Notification, NotificationSink, NotifyError};
use cartage_core::store::DocumentStore;

/// Notification sink that persists records into the `notifications`
/// collection, where the client portals read them.
pub struct StoreNotificationSink {
    store: Arc<dyn DocumentStore>,
}

impl StoreNotificationSink {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl NotificationSink for StoreNotificationSink {
    async fn create(&self, notification: Notification) -> Result<(), NotifyError> {
        let mut data = serde_json::to_value(&notification)
            .map_err(|err| NotifyError::Dispatch(err.to_string()))?;
        data["createdAt"] = serde_json::json!(Utc::now());

        let id = self
            .store
            .add("notifications", data)
            .await
            .map_err(|err| NotifyError::Dispatch(err.to_string()))?;

        debug!(notification_id = %id, recipient_id = %notification.recipient_id, "notification stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use cartage_core::notify::NotificationPriority;
    use cartage_core::store::QueryOp;
    use serde_json::json;

    #[tokio::test]
    async fn test_notification_is_stored_in_schema_shape() {
        let store = Arc::new(MemoryStore::new());
        let sink = StoreNotificationSink::new(store.clone());

        sink.create(Notification {
            recipient_id: "client-1".to_string(),
            kind: "delivery_delivered".to_string(),
            title: "Delivery Completed".to_string(),
            message: "Your cargo has arrived. Please confirm completion.".to_string(),
            delivery_id: Some("d1".to_string()),
            status: Some("delivered".to_string()),
            action_required: true,
            priority: NotificationPriority::High,
            is_read: false,
        })
        .await
        .unwrap();

        let docs = store
            .query("notifications", "recipientId", QueryOp::Eq, json!("client-1"))
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].data["type"], "delivery_delivered");
        assert_eq!(docs[0].data["actionRequired"], true);
        assert_eq!(docs[0].data["isRead"], false);
        assert!(docs[0].data["createdAt"].is_string());
    }
}
