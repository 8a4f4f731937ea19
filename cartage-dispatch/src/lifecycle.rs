use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use cartage_core::notify::{Notification, NotificationPriority, NotificationSink};
use cartage_core::store::{DocumentStore, FieldOp, QueryOp, StoreError};

use crate::models::{collections, CrewStatus, Delivery, DeliveryStatus, GeoPoint, TruckStatus};
use crate::payments::{PaymentError, PaymentSynchronizer};

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Delivery not found: {0}")]
    NotFound(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: DeliveryStatus,
        to: DeliveryStatus,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Malformed document: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error(transparent)]
    Payment(#[from] PaymentError),
}

/// Result of a successful status transition.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    pub status: DeliveryStatus,
    pub message: String,
}

struct NotificationTemplate {
    kind: &'static str,
    title: &'static str,
    message: &'static str,
    action_required: bool,
    priority: NotificationPriority,
}

/// Owns the delivery status state machine and its downstream effects:
/// resource restoration, truck statistics, payment-status sync and client
/// notifications.
///
/// Only the primary writes (the delivery status update and, on cancellation,
/// the payment batch) can fail the operation; every other side effect is
/// logged and dropped on failure.
pub struct DeliveryLifecycleCoordinator {
    store: Arc<dyn DocumentStore>,
    notifications: Arc<dyn NotificationSink>,
    payments: Arc<PaymentSynchronizer>,
}

impl DeliveryLifecycleCoordinator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        notifications: Arc<dyn NotificationSink>,
        payments: Arc<PaymentSynchronizer>,
    ) -> Self {
        Self {
            store,
            notifications,
            payments,
        }
    }

    pub(crate) fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub(crate) async fn load_delivery(&self, delivery_id: &str) -> Result<Delivery, LifecycleError> {
        let value = self
            .store
            .get(collections::DELIVERIES, delivery_id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(delivery_id.to_string()))?;
        Ok(serde_json::from_value(value)?)
    }

    /// Apply a requested status transition to a delivery.
    pub async fn advance_status(
        &self,
        delivery_id: &str,
        actor_id: &str,
        target: DeliveryStatus,
        location: Option<GeoPoint>,
    ) -> Result<TransitionOutcome, LifecycleError> {
        let delivery = self.load_delivery(delivery_id).await?;

        if !delivery.status.can_transition_to(target) {
            return Err(LifecycleError::InvalidTransition {
                from: delivery.status,
                to: target,
            });
        }

        // 1. Primary write: status, transition timestamp, crew mirrors and
        //    location, as one atomic document update.
        let mut fields = vec![
            ("status".to_string(), FieldOp::Set(json!(target.as_str()))),
            ("updatedAt".to_string(), FieldOp::ServerTimestamp),
        ];

        let crew = target.crew_status();
        fields.push(("driverStatus".to_string(), FieldOp::Set(json!(crew.as_str()))));
        fields.push(("helperStatus".to_string(), FieldOp::Set(json!(crew.as_str()))));

        match target {
            DeliveryStatus::Accepted => {
                fields.push(("acceptedAt".to_string(), FieldOp::ServerTimestamp));
            }
            DeliveryStatus::Started => {
                fields.push(("startedAt".to_string(), FieldOp::ServerTimestamp));
            }
            DeliveryStatus::PickedUp => {
                fields.push(("pickedUpAt".to_string(), FieldOp::ServerTimestamp));
            }
            DeliveryStatus::Delivered => {
                fields.push(("deliveredAt".to_string(), FieldOp::ServerTimestamp));
                fields.push(("driverCompletedAt".to_string(), FieldOp::ServerTimestamp));
                fields.push((
                    "awaitingClientConfirmation".to_string(),
                    FieldOp::Set(json!(true)),
                ));
            }
            DeliveryStatus::Completed => {
                fields.push(("completedAt".to_string(), FieldOp::ServerTimestamp));
                fields.push(("finalCompletedAt".to_string(), FieldOp::ServerTimestamp));
                fields.push((
                    "awaitingClientConfirmation".to_string(),
                    FieldOp::Set(json!(false)),
                ));
            }
            DeliveryStatus::Cancelled => {
                fields.push(("cancelledAt".to_string(), FieldOp::ServerTimestamp));
            }
            DeliveryStatus::Pending => {}
        }

        if let Some(point) = location {
            fields.push(("location".to_string(), FieldOp::Set(json!(point))));
        }

        self.store
            .update(collections::DELIVERIES, delivery_id, fields)
            .await?;

        info!(
            delivery_id = %delivery_id,
            actor_id = %actor_id,
            from = %delivery.status,
            to = %target,
            "delivery status advanced"
        );

        // 2. Truck statistics accrue once, when the haul is delivered.
        if target == DeliveryStatus::Delivered {
            if let Some(truck_id) = &delivery.truck_id {
                if let Err(err) = self.record_truck_stats(truck_id, delivery.distance_km).await {
                    warn!(truck_id = %truck_id, error = %err, "truck stats update failed");
                }
            }
        }

        // 3. Concluding statuses hand the truck and crew back to the pool.
        if matches!(
            target,
            DeliveryStatus::Delivered | DeliveryStatus::Completed | DeliveryStatus::Cancelled
        ) {
            self.restore_resources(&delivery).await;
        }

        // 4. Cancellation keeps the payment records in lockstep.
        if target == DeliveryStatus::Cancelled {
            self.payments.cancel_payment(delivery_id).await?;
        }

        // 5. Client notification, swallowed on failure.
        if let Some(template) = notification_for(target) {
            let notification = Notification {
                recipient_id: delivery.client_id.clone(),
                kind: template.kind.to_string(),
                title: template.title.to_string(),
                message: template.message.to_string(),
                delivery_id: Some(delivery_id.to_string()),
                status: Some(target.as_str().to_string()),
                action_required: template.action_required,
                priority: template.priority,
                is_read: false,
            };
            if let Err(err) = self.notifications.create(notification).await {
                warn!(
                    delivery_id = %delivery_id,
                    client_id = %delivery.client_id,
                    error = %err,
                    "client notification failed"
                );
            }
        }

        Ok(TransitionOutcome {
            status: target,
            message: success_message(target).to_string(),
        })
    }

    async fn record_truck_stats(&self, truck_id: &str, distance_km: f64) -> Result<(), StoreError> {
        self.store
            .update(
                collections::TRUCKS,
                truck_id,
                vec![
                    ("totalDeliveries".to_string(), FieldOp::Increment(1.0)),
                    ("totalKilometers".to_string(), FieldOp::Increment(distance_km)),
                ],
            )
            .await
    }

    /// Restore truck, driver and helper to idle states. Each resource is a
    /// separate write so one missing document cannot block the others.
    async fn restore_resources(&self, delivery: &Delivery) {
        if let Some(truck_id) = &delivery.truck_id {
            if let Err(err) = self.restore_truck(truck_id).await {
                warn!(truck_id = %truck_id, error = %err, "truck restoration failed");
            }
        }
        if let Some(driver_id) = &delivery.driver_id {
            if let Err(err) = self.restore_crew(collections::DRIVERS, driver_id).await {
                warn!(driver_id = %driver_id, error = %err, "driver restoration failed");
            }
        }
        if let Some(helper_id) = &delivery.helper_id {
            if let Err(err) = self.restore_crew(collections::HELPERS, helper_id).await {
                warn!(helper_id = %helper_id, error = %err, "helper restoration failed");
            }
        }
    }

    async fn restore_truck(&self, truck_id: &str) -> Result<(), StoreError> {
        let allocations = self
            .store
            .query(collections::ALLOCATIONS, "truckId", QueryOp::Eq, json!(truck_id))
            .await?;
        let has_active = allocations
            .iter()
            .any(|doc| doc.data["active"].as_bool().unwrap_or(false));

        let status = if has_active {
            TruckStatus::Free
        } else {
            TruckStatus::Available
        };

        self.store
            .update(
                collections::TRUCKS,
                truck_id,
                vec![
                    ("status".to_string(), FieldOp::Set(json!(status.as_str()))),
                    ("activeDelivery".to_string(), FieldOp::Delete),
                    ("currentDeliveryId".to_string(), FieldOp::Delete),
                    ("updatedAt".to_string(), FieldOp::ServerTimestamp),
                ],
            )
            .await
    }

    async fn restore_crew(&self, collection: &str, member_id: &str) -> Result<(), StoreError> {
        self.store
            .update(
                collection,
                member_id,
                vec![
                    (
                        "status".to_string(),
                        FieldOp::Set(json!(CrewStatus::Active.as_str())),
                    ),
                    ("updatedAt".to_string(), FieldOp::ServerTimestamp),
                ],
            )
            .await
    }
}

fn success_message(status: DeliveryStatus) -> &'static str {
    match status {
        DeliveryStatus::Pending => "Delivery updated successfully.",
        DeliveryStatus::Accepted => "Delivery accepted successfully.",
        DeliveryStatus::Started => "Delivery started successfully.",
        DeliveryStatus::PickedUp => "Cargo picked up successfully.",
        DeliveryStatus::Delivered => "Delivery marked as delivered. Awaiting client confirmation.",
        DeliveryStatus::Completed => "Delivery completed successfully.",
        DeliveryStatus::Cancelled => "Delivery cancelled successfully.",
    }
}

fn notification_for(status: DeliveryStatus) -> Option<NotificationTemplate> {
    match status {
        DeliveryStatus::Accepted => Some(NotificationTemplate {
            kind: "delivery_accepted",
            title: "Delivery Accepted",
            message: "A driver has accepted your delivery.",
            action_required: false,
            priority: NotificationPriority::Normal,
        }),
        DeliveryStatus::Started => Some(NotificationTemplate {
            kind: "delivery_started",
            title: "Delivery Started",
            message: "Your delivery is on its way.",
            action_required: false,
            priority: NotificationPriority::Normal,
        }),
        DeliveryStatus::PickedUp => Some(NotificationTemplate {
            kind: "delivery_picked_up",
            title: "Cargo Picked Up",
            message: "Your cargo has been picked up and is in transit.",
            action_required: false,
            priority: NotificationPriority::Normal,
        }),
        DeliveryStatus::Delivered => Some(NotificationTemplate {
            kind: "delivery_delivered",
            title: "Delivery Completed",
            message: "Your cargo has arrived. Please confirm completion.",
            action_required: true,
            priority: NotificationPriority::High,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PaymentRules, PaymentState};
    use crate::payments::MockGateway;
    use cartage_core::notify::NotifyError;
    use cartage_store::MemoryStore;
    use serde_json::Value;
    use std::sync::Mutex;

    struct RecordingSink {
        sent: Mutex<Vec<Notification>>,
        fail: bool,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn sent(&self) -> Vec<Notification> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl NotificationSink for RecordingSink {
        async fn create(&self, notification: Notification) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError::Dispatch("sink offline".to_string()));
            }
            self.sent.lock().unwrap().push(notification);
            Ok(())
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        sink: Arc<RecordingSink>,
        coordinator: DeliveryLifecycleCoordinator,
    }

    fn harness_with_sink(sink: RecordingSink) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(sink);
        let payments = Arc::new(PaymentSynchronizer::new(
            store.clone(),
            Arc::new(MockGateway::new()),
            PaymentRules::default(),
        ));
        let coordinator =
            DeliveryLifecycleCoordinator::new(store.clone(), sink.clone(), payments);
        Harness {
            store,
            sink,
            coordinator,
        }
    }

    fn harness() -> Harness {
        harness_with_sink(RecordingSink::new())
    }

    async fn seed(store: &MemoryStore, collection: &str, value: Value) {
        store.add(collection, value).await.unwrap();
    }

    async fn seed_delivery(store: &MemoryStore, status: DeliveryStatus) -> Delivery {
        let mut delivery = Delivery::new("client-1", Some("truck-1".to_string()));
        delivery.id = "d1".to_string();
        delivery.driver_id = Some("driver-1".to_string());
        delivery.helper_id = Some("helper-1".to_string());
        delivery.status = status;
        delivery.distance_km = 50.0;
        delivery.rate = Some(1000.0);
        seed(store, collections::DELIVERIES, serde_json::to_value(&delivery).unwrap()).await;
        seed(
            store,
            collections::TRUCKS,
            json!({ "id": "truck-1", "status": "on-delivery", "totalDeliveries": 3, "totalKilometers": 120.0, "activeDelivery": true, "currentDeliveryId": "d1" }),
        )
        .await;
        seed(store, collections::DRIVERS, json!({ "id": "driver-1", "name": "R. Santos", "status": "in_progress" })).await;
        seed(store, collections::HELPERS, json!({ "id": "helper-1", "name": "J. Cruz", "status": "in_progress" })).await;
        delivery
    }

    #[tokio::test]
    async fn test_unknown_delivery_is_rejected_before_writes() {
        let h = harness();
        let err = h
            .coordinator
            .advance_status("ghost", "driver-1", DeliveryStatus::Accepted, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound(_)));
        assert!(h.sink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_transition_is_rejected() {
        let h = harness();
        seed_delivery(&h.store, DeliveryStatus::Pending).await;

        let err = h
            .coordinator
            .advance_status("d1", "driver-1", DeliveryStatus::Delivered, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidTransition {
                from: DeliveryStatus::Pending,
                to: DeliveryStatus::Delivered,
            }
        ));
    }

    #[tokio::test]
    async fn test_repeat_completion_is_rejected() {
        let h = harness();
        seed_delivery(&h.store, DeliveryStatus::Completed).await;

        let err = h
            .coordinator
            .advance_status("d1", "operator-1", DeliveryStatus::Completed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));

        // Stats were not double-counted.
        let truck = h.store.get(collections::TRUCKS, "truck-1").await.unwrap().unwrap();
        assert_eq!(truck["totalDeliveries"], 3);
    }

    #[tokio::test]
    async fn test_accept_sets_timestamp_and_mirrors() {
        let h = harness();
        seed_delivery(&h.store, DeliveryStatus::Pending).await;

        let outcome = h
            .coordinator
            .advance_status("d1", "driver-1", DeliveryStatus::Accepted, None)
            .await
            .unwrap();
        assert_eq!(outcome.status, DeliveryStatus::Accepted);
        assert_eq!(outcome.message, "Delivery accepted successfully.");

        let doc = h.store.get(collections::DELIVERIES, "d1").await.unwrap().unwrap();
        assert_eq!(doc["status"], "accepted");
        assert_eq!(doc["driverStatus"], "accepted");
        assert_eq!(doc["helperStatus"], "accepted");
        assert!(doc["acceptedAt"].is_string());

        let sent = h.sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, "delivery_accepted");
        assert_eq!(sent[0].recipient_id, "client-1");
    }

    #[tokio::test]
    async fn test_delivered_updates_truck_stats_and_notifies() {
        let h = harness();
        seed_delivery(&h.store, DeliveryStatus::PickedUp).await;

        let outcome = h
            .coordinator
            .advance_status(
                "d1",
                "driver-1",
                DeliveryStatus::Delivered,
                Some(GeoPoint { lat: 14.6, lng: 121.0 }),
            )
            .await
            .unwrap();
        assert_eq!(
            outcome.message,
            "Delivery marked as delivered. Awaiting client confirmation."
        );

        let doc = h.store.get(collections::DELIVERIES, "d1").await.unwrap().unwrap();
        assert_eq!(doc["status"], "delivered");
        assert_eq!(doc["awaitingClientConfirmation"], true);
        assert!(doc["deliveredAt"].is_string());
        assert!(doc["driverCompletedAt"].is_string());
        assert_eq!(doc["location"]["lat"], 14.6);

        let truck = h.store.get(collections::TRUCKS, "truck-1").await.unwrap().unwrap();
        assert_eq!(truck["totalDeliveries"], 4.0);
        assert_eq!(truck["totalKilometers"], 170.0);
        // Truck went back to the pool; no active allocation exists.
        assert_eq!(truck["status"], "available");
        assert!(truck.get("activeDelivery").is_none());
        assert!(truck.get("currentDeliveryId").is_none());

        let driver = h.store.get(collections::DRIVERS, "driver-1").await.unwrap().unwrap();
        assert_eq!(driver["status"], "active");
        let helper = h.store.get(collections::HELPERS, "helper-1").await.unwrap().unwrap();
        assert_eq!(helper["status"], "active");

        let sent = h.sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, "delivery_delivered");
        assert!(sent[0].action_required);
    }

    #[tokio::test]
    async fn test_truck_with_active_allocation_restores_to_free() {
        let h = harness();
        seed_delivery(&h.store, DeliveryStatus::Delivered).await;
        seed(
            &h.store,
            collections::ALLOCATIONS,
            json!({ "id": "a1", "truckId": "truck-1", "active": true }),
        )
        .await;

        h.coordinator
            .advance_status("d1", "operator-1", DeliveryStatus::Completed, None)
            .await
            .unwrap();

        let truck = h.store.get(collections::TRUCKS, "truck-1").await.unwrap().unwrap();
        assert_eq!(truck["status"], "free");
    }

    #[tokio::test]
    async fn test_completion_clears_confirmation_flag_without_notifying() {
        let h = harness();
        seed_delivery(&h.store, DeliveryStatus::Delivered).await;

        let outcome = h
            .coordinator
            .advance_status("d1", "operator-1", DeliveryStatus::Completed, None)
            .await
            .unwrap();
        assert_eq!(outcome.message, "Delivery completed successfully.");

        let doc = h.store.get(collections::DELIVERIES, "d1").await.unwrap().unwrap();
        assert_eq!(doc["status"], "completed");
        assert_eq!(doc["awaitingClientConfirmation"], false);
        assert!(doc["completedAt"].is_string());
        assert!(doc["finalCompletedAt"].is_string());

        assert!(h.sink.sent().is_empty());

        // Delivered stats were recorded in a previous transition; completion
        // adds nothing.
        let truck = h.store.get(collections::TRUCKS, "truck-1").await.unwrap().unwrap();
        assert_eq!(truck["totalDeliveries"], 3);
    }

    #[tokio::test]
    async fn test_cancellation_cancels_payments() {
        let h = harness();
        let delivery = seed_delivery(&h.store, DeliveryStatus::Accepted).await;

        // A pending payment exists for the delivery.
        let payments = PaymentSynchronizer::new(
            h.store.clone(),
            Arc::new(MockGateway::new()),
            PaymentRules::default(),
        );
        payments.ensure_payment(&delivery).await.unwrap();

        h.coordinator
            .advance_status("d1", "operator-1", DeliveryStatus::Cancelled, None)
            .await
            .unwrap();

        let doc = h.store.get(collections::DELIVERIES, "d1").await.unwrap().unwrap();
        assert_eq!(doc["status"], "cancelled");
        assert_eq!(doc["paymentStatus"], "cancelled");
        assert!(doc["cancelledAt"].is_string());

        let payment_docs = h
            .store
            .query(collections::PAYMENTS, "deliveryId", QueryOp::Eq, json!("d1"))
            .await
            .unwrap();
        assert_eq!(payment_docs.len(), 1);
        assert_eq!(payment_docs[0].data["status"], "cancelled");

        assert!(h.sink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_paid_delivery_keeps_payment_on_cancel() {
        let h = harness();
        let mut delivery = Delivery::new("client-1", Some("truck-1".to_string()));
        delivery.id = "d1".to_string();
        delivery.status = DeliveryStatus::Accepted;
        delivery.payment_status = PaymentState::Paid;
        seed(&h.store, collections::DELIVERIES, serde_json::to_value(&delivery).unwrap()).await;
        seed(&h.store, collections::TRUCKS, json!({ "id": "truck-1", "status": "on-delivery" })).await;

        h.coordinator
            .advance_status("d1", "operator-1", DeliveryStatus::Cancelled, None)
            .await
            .unwrap();

        let doc = h.store.get(collections::DELIVERIES, "d1").await.unwrap().unwrap();
        assert_eq!(doc["status"], "cancelled");
        assert_eq!(doc["paymentStatus"], "paid");
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_transition() {
        let h = harness_with_sink(RecordingSink::failing());
        seed_delivery(&h.store, DeliveryStatus::Pending).await;

        let outcome = h
            .coordinator
            .advance_status("d1", "driver-1", DeliveryStatus::Accepted, None)
            .await
            .unwrap();
        assert_eq!(outcome.status, DeliveryStatus::Accepted);

        let doc = h.store.get(collections::DELIVERIES, "d1").await.unwrap().unwrap();
        assert_eq!(doc["status"], "accepted");
    }

    #[tokio::test]
    async fn test_missing_helper_does_not_block_other_restorations() {
        let h = harness();
        seed_delivery(&h.store, DeliveryStatus::Delivered).await;
        h.store
            .update(
                collections::DELIVERIES,
                "d1",
                vec![("helperId".to_string(), FieldOp::Set(json!("ghost-helper")))],
            )
            .await
            .unwrap();

        h.coordinator
            .advance_status("d1", "operator-1", DeliveryStatus::Completed, None)
            .await
            .unwrap();

        let driver = h.store.get(collections::DRIVERS, "driver-1").await.unwrap().unwrap();
        assert_eq!(driver["status"], "active");
        let truck = h.store.get(collections::TRUCKS, "truck-1").await.unwrap().unwrap();
        assert_eq!(truck["status"], "available");
    }
}
