use rand::Rng;
use serde_json::json;
use tracing::{info, warn};

use cartage_core::store::{DocumentStore, FieldOp, QueryOp};

use crate::lifecycle::{DeliveryLifecycleCoordinator, LifecycleError};
use crate::models::collections;

/// Result of a driver-assignment attempt. The empty-pool case is a normal
/// outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentOutcome {
    Assigned {
        driver_id: String,
        driver_name: String,
    },
    NoDriversAvailable,
}

impl DeliveryLifecycleCoordinator {
    /// Pick one driver uniformly at random among those currently active and
    /// attach them to the delivery.
    ///
    /// Two concurrent calls can select the same driver; the pool is not
    /// locked against that.
    pub async fn assign_random_driver(
        &self,
        delivery_id: &str,
    ) -> Result<AssignmentOutcome, LifecycleError> {
        self.load_delivery(delivery_id).await?;

        let candidates = self
            .store()
            .query(collections::DRIVERS, "status", QueryOp::Eq, json!("active"))
            .await?;

        if candidates.is_empty() {
            warn!(delivery_id = %delivery_id, "no active drivers to assign");
            return Ok(AssignmentOutcome::NoDriversAvailable);
        }

        let pick = &candidates[rand::thread_rng().gen_range(0..candidates.len())];
        let driver_id = pick.id.clone();
        let driver_name = pick.data["name"].as_str().unwrap_or("").to_string();

        self.store()
            .update(
                collections::DELIVERIES,
                delivery_id,
                vec![
                    ("driverId".to_string(), FieldOp::Set(json!(driver_id))),
                    ("driverName".to_string(), FieldOp::Set(json!(driver_name))),
                    ("updatedAt".to_string(), FieldOp::ServerTimestamp),
                ],
            )
            .await?;

        info!(
            delivery_id = %delivery_id,
            driver_id = %driver_id,
            "driver assigned at random"
        );

        Ok(AssignmentOutcome::Assigned {
            driver_id,
            driver_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Delivery, PaymentRules};
    use crate::payments::{MockGateway, PaymentSynchronizer};
    use cartage_core::notify::{Notification, NotificationSink, NotifyError};
    use cartage_core::store::DocumentStore;
    use cartage_store::MemoryStore;
    use std::sync::Arc;

    struct NullSink;

    #[async_trait::async_trait]
    impl NotificationSink for NullSink {
        async fn create(&self, _notification: Notification) -> Result<(), NotifyError> {
            Ok(())
        }
    }

    fn coordinator(store: Arc<MemoryStore>) -> DeliveryLifecycleCoordinator {
        let payments = Arc::new(PaymentSynchronizer::new(
            store.clone(),
            Arc::new(MockGateway::new()),
            PaymentRules::default(),
        ));
        DeliveryLifecycleCoordinator::new(store, Arc::new(NullSink), payments)
    }

    async fn seed_delivery(store: &MemoryStore) {
        let mut delivery = Delivery::new("client-1", Some("truck-1".to_string()));
        delivery.id = "d1".to_string();
        store
            .add(collections::DELIVERIES, serde_json::to_value(&delivery).unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_no_active_drivers_returns_structured_outcome() {
        let store = Arc::new(MemoryStore::new());
        seed_delivery(&store).await;
        store
            .add(
                collections::DRIVERS,
                serde_json::json!({ "id": "driver-1", "name": "Off Duty", "status": "in_progress" }),
            )
            .await
            .unwrap();

        let outcome = coordinator(store.clone())
            .assign_random_driver("d1")
            .await
            .unwrap();
        assert_eq!(outcome, AssignmentOutcome::NoDriversAvailable);

        // No writes happened.
        let doc = store.get(collections::DELIVERIES, "d1").await.unwrap().unwrap();
        assert!(doc["driverId"].is_null());
    }

    #[tokio::test]
    async fn test_assignment_picks_an_active_driver() {
        let store = Arc::new(MemoryStore::new());
        seed_delivery(&store).await;
        for i in 0..3 {
            store
                .add(
                    collections::DRIVERS,
                    serde_json::json!({
                        "id": format!("driver-{i}"),
                        "name": format!("Driver {i}"),
                        "status": "active",
                    }),
                )
                .await
                .unwrap();
        }

        let outcome = coordinator(store.clone())
            .assign_random_driver("d1")
            .await
            .unwrap();
        let AssignmentOutcome::Assigned { driver_id, driver_name } = outcome else {
            panic!("expected an assignment");
        };
        assert!(driver_id.starts_with("driver-"));

        let doc = store.get(collections::DELIVERIES, "d1").await.unwrap().unwrap();
        assert_eq!(doc["driverId"], driver_id.as_str());
        assert_eq!(doc["driverName"], driver_name.as_str());
    }

    #[tokio::test]
    async fn test_assignment_requires_existing_delivery() {
        let store = Arc::new(MemoryStore::new());
        let err = coordinator(store)
            .assign_random_driver("ghost")
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound(_)));
    }
}
