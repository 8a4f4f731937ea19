use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use cartage_core::gateway::{
    GatewayError, IntentStatus, PaymentGateway, PaymentIntent, PaymentSource, SourceAttributes,
    SourceStatus,
};
use cartage_core::store::{DocumentStore, FieldOp, QueryOp, StoreError, WriteBatch};

use crate::fees;
use crate::models::{collections, Delivery, DeliveryStatus, PaymentRecord, PaymentRules, PaymentState};

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Delivery not found: {0}")]
    DeliveryNotFound(String),

    #[error("No payment recorded for intent: {0}")]
    PaymentNotFound(String),

    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Malformed document: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A client's billing summary line for one delivery. Derived, never stored.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
    pub delivery_id: String,
    pub amount: f64,
    pub due_date: DateTime<Utc>,
    pub status: PaymentState,
}

/// Outcome of a client payment-standing reconciliation pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconciliation {
    pub overdue_count: usize,
    pub can_book_trucks: bool,
}

/// Result of handling a gateway-reported intent resolution.
#[derive(Debug, Clone)]
pub enum CompletionOutcome {
    Paid {
        payment_id: String,
        transaction_fee: f64,
        net_amount: f64,
    },
    Failed {
        payment_id: String,
        reason: String,
    },
    /// Intent is still in flight; nothing to record yet.
    Ignored {
        status: IntentStatus,
    },
}

/// Derive the billing view of a delivery. Cancelled deliveries are never
/// billed and yield `None`.
pub fn payment_view(
    delivery: &Delivery,
    rules: &PaymentRules,
    now: DateTime<Utc>,
) -> Option<PaymentView> {
    if delivery.status == DeliveryStatus::Cancelled {
        return None;
    }

    let amount = delivery.rate.unwrap_or(rules.default_rate);
    let due_date = delivery.due_date.unwrap_or_else(|| {
        delivery.delivery_date.unwrap_or(delivery.created_at) + Duration::days(rules.due_days)
    });

    let status = if delivery.payment_status == PaymentState::Paid {
        PaymentState::Paid
    } else if due_date < now && delivery.status == DeliveryStatus::Completed {
        PaymentState::Overdue
    } else {
        PaymentState::Pending
    };

    Some(PaymentView {
        delivery_id: delivery.id.clone(),
        amount,
        due_date,
        status,
    })
}

/// Keeps payment records consistent with delivery lifecycle events and with
/// the external gateway. Local state is authoritative: gateway calls never
/// gate local writes on the cancellation path.
pub struct PaymentSynchronizer {
    store: Arc<dyn DocumentStore>,
    gateway: Arc<dyn PaymentGateway>,
    rules: PaymentRules,
}

impl PaymentSynchronizer {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        gateway: Arc<dyn PaymentGateway>,
        rules: PaymentRules,
    ) -> Self {
        Self { store, gateway, rules }
    }

    pub fn rules(&self) -> &PaymentRules {
        &self.rules
    }

    pub fn view_for(&self, delivery: &Delivery, now: DateTime<Utc>) -> Option<PaymentView> {
        payment_view(delivery, &self.rules, now)
    }

    async fn load_delivery(&self, delivery_id: &str) -> Result<Delivery, PaymentError> {
        let value = self
            .store
            .get(collections::DELIVERIES, delivery_id)
            .await?
            .ok_or_else(|| PaymentError::DeliveryNotFound(delivery_id.to_string()))?;
        Ok(serde_json::from_value(value)?)
    }

    async fn payments_for_delivery(
        &self,
        delivery_id: &str,
    ) -> Result<Vec<PaymentRecord>, PaymentError> {
        let docs = self
            .store
            .query(collections::PAYMENTS, "deliveryId", QueryOp::Eq, json!(delivery_id))
            .await?;

        let mut records = Vec::with_capacity(docs.len());
        for doc in docs {
            records.push(serde_json::from_value(doc.data)?);
        }
        Ok(records)
    }

    /// Fetch the delivery's live payment record, creating one on demand.
    ///
    /// At most one non-cancelled payment may exist per delivery; if one is
    /// already there it is returned as-is.
    pub async fn ensure_payment(&self, delivery: &Delivery) -> Result<PaymentRecord, PaymentError> {
        let existing = self.payments_for_delivery(&delivery.id).await?;
        if let Some(record) = existing
            .into_iter()
            .find(|r| r.status != PaymentState::Cancelled)
        {
            return Ok(record);
        }

        let now = Utc::now();
        let due_date = delivery.due_date.unwrap_or_else(|| {
            delivery.delivery_date.unwrap_or(delivery.created_at)
                + Duration::days(self.rules.due_days)
        });

        let record = PaymentRecord {
            id: Uuid::new_v4().to_string(),
            delivery_id: delivery.id.clone(),
            client_id: delivery.client_id.clone(),
            amount: delivery.rate.unwrap_or(self.rules.default_rate),
            currency: self.rules.currency.clone(),
            status: PaymentState::Pending,
            due_date: Some(due_date),
            paid_at: None,
            payment_method: None,
            intent_id: None,
            transaction_fee: None,
            net_amount: None,
            failure_reason: None,
            created_at: now,
            updated_at: Some(now),
        };

        self.store
            .add(collections::PAYMENTS, serde_json::to_value(&record)?)
            .await?;

        info!(delivery_id = %delivery.id, payment_id = %record.id, "payment record created");
        Ok(record)
    }

    /// Backfill payment records for every non-cancelled delivery of a client
    /// that does not have one yet. Returns the created payment ids.
    pub async fn generate_from_deliveries(
        &self,
        client_id: &str,
    ) -> Result<Vec<String>, PaymentError> {
        let docs = self
            .store
            .query(collections::DELIVERIES, "clientId", QueryOp::Eq, json!(client_id))
            .await?;

        let mut created = Vec::new();
        for doc in docs {
            let delivery: Delivery = serde_json::from_value(doc.data)?;
            if delivery.status == DeliveryStatus::Cancelled {
                continue;
            }
            let had_one = self
                .payments_for_delivery(&delivery.id)
                .await?
                .iter()
                .any(|r| r.status != PaymentState::Cancelled);
            if !had_one {
                created.push(self.ensure_payment(&delivery).await?.id);
            }
        }
        Ok(created)
    }

    /// Create (or refresh) the gateway intent backing a delivery's payment.
    /// Gateway failure here is surfaced to the caller.
    pub async fn initialize_gateway_payment(
        &self,
        delivery: &Delivery,
    ) -> Result<(PaymentRecord, PaymentIntent), PaymentError> {
        let record = self.ensure_payment(delivery).await?;

        if let Some(intent_id) = &record.intent_id {
            let intent = self.gateway.get_intent(intent_id).await?;
            return Ok((record, intent));
        }

        let intent = self
            .gateway
            .create_intent(
                record.amount,
                &record.currency,
                json!({ "deliveryId": record.delivery_id, "paymentId": record.id }),
            )
            .await?;

        self.store
            .update(
                collections::PAYMENTS,
                &record.id,
                vec![
                    ("intentId".to_string(), FieldOp::Set(json!(intent.id))),
                    ("updatedAt".to_string(), FieldOp::ServerTimestamp),
                ],
            )
            .await?;

        Ok((record, intent))
    }

    /// Open a redirect-based checkout source for a delivery's payment.
    pub async fn create_checkout_source(
        &self,
        delivery: &Delivery,
        source_type: &str,
        success_url: &str,
        failed_url: &str,
    ) -> Result<(PaymentRecord, PaymentSource), PaymentError> {
        let record = self.ensure_payment(delivery).await?;

        let source = self
            .gateway
            .create_source(SourceAttributes {
                amount: record.amount,
                currency: record.currency.clone(),
                source_type: source_type.to_string(),
                success_url: success_url.to_string(),
                failed_url: failed_url.to_string(),
            })
            .await?;

        Ok((record, source))
    }

    /// Poll the gateway for a checkout source's standing.
    pub async fn source_status(&self, source_id: &str) -> Result<PaymentSource, PaymentError> {
        Ok(self.gateway.get_source(source_id).await?)
    }

    /// Cancel every non-paid payment of a delivery.
    ///
    /// Gateway cancellation is attempted first but is best-effort; the local
    /// batch commits regardless. Paid payments are left untouched. Returns
    /// the number of payments cancelled locally.
    pub async fn cancel_payment(&self, delivery_id: &str) -> Result<usize, PaymentError> {
        let delivery = self.load_delivery(delivery_id).await?;
        let records = self.payments_for_delivery(delivery_id).await?;

        let mut batch = WriteBatch::new();
        let mut cancelled = 0;

        for record in &records {
            if matches!(record.status, PaymentState::Paid | PaymentState::Cancelled) {
                continue;
            }

            if let Some(intent_id) = &record.intent_id {
                if let Err(err) = self.gateway.cancel_intent(intent_id).await {
                    warn!(
                        payment_id = %record.id,
                        intent_id = %intent_id,
                        error = %err,
                        "gateway cancel failed; cancelling locally anyway"
                    );
                }
            }

            batch.update(
                collections::PAYMENTS,
                record.id.clone(),
                vec![
                    ("status".to_string(), FieldOp::Set(json!(PaymentState::Cancelled.as_str()))),
                    ("updatedAt".to_string(), FieldOp::ServerTimestamp),
                ],
            );
            cancelled += 1;
        }

        // A paid delivery keeps its payment standing; refunds are not modeled.
        if delivery.payment_status != PaymentState::Paid {
            batch.update(
                collections::DELIVERIES,
                delivery_id,
                vec![
                    (
                        "paymentStatus".to_string(),
                        FieldOp::Set(json!(PaymentState::Cancelled.as_str())),
                    ),
                    ("updatedAt".to_string(), FieldOp::ServerTimestamp),
                ],
            );
        }

        if !batch.is_empty() {
            self.store.commit(batch).await?;
        }

        info!(delivery_id = %delivery_id, cancelled, "payments cancelled for delivery");
        Ok(cancelled)
    }

    /// Recompute a client's aggregate payment standing.
    ///
    /// Pending payments past their due date are marked overdue in one atomic
    /// batch together with the client's own standing fields. The booking gate
    /// contract is `can_book_trucks == (overdue_count == 0)`.
    pub async fn reconcile_client_payment_status(
        &self,
        client_id: &str,
    ) -> Result<Reconciliation, PaymentError> {
        let now = Utc::now();
        let docs = self
            .store
            .query(collections::PAYMENTS, "clientId", QueryOp::Eq, json!(client_id))
            .await?;

        let mut overdue_count = 0;
        let mut batch = WriteBatch::new();

        for doc in docs {
            let record: PaymentRecord = serde_json::from_value(doc.data)?;
            match record.status {
                PaymentState::Overdue => overdue_count += 1,
                PaymentState::Pending => {
                    if record.due_date.is_some_and(|due| due < now) {
                        batch.update(
                            collections::PAYMENTS,
                            record.id.clone(),
                            vec![
                                (
                                    "status".to_string(),
                                    FieldOp::Set(json!(PaymentState::Overdue.as_str())),
                                ),
                                ("updatedAt".to_string(), FieldOp::ServerTimestamp),
                            ],
                        );
                        overdue_count += 1;
                    }
                }
                _ => {}
            }
        }

        let can_book_trucks = overdue_count == 0;
        let standing = if can_book_trucks { "current" } else { "overdue" };
        batch.update(
            collections::CLIENTS,
            client_id,
            vec![
                ("paymentStatus".to_string(), FieldOp::Set(json!(standing))),
                ("canBookTrucks".to_string(), FieldOp::Set(json!(can_book_trucks))),
                ("updatedAt".to_string(), FieldOp::ServerTimestamp),
            ],
        );

        self.store.commit(batch).await?;

        Ok(Reconciliation {
            overdue_count,
            can_book_trucks,
        })
    }

    /// Apply a gateway-reported intent resolution to the local records.
    pub async fn process_gateway_completion(
        &self,
        intent_id: &str,
    ) -> Result<CompletionOutcome, PaymentError> {
        let intent = self.gateway.get_intent(intent_id).await?;

        let docs = self
            .store
            .query(collections::PAYMENTS, "intentId", QueryOp::Eq, json!(intent_id))
            .await?;
        let record: PaymentRecord = docs
            .into_iter()
            .next()
            .map(|doc| serde_json::from_value(doc.data))
            .transpose()?
            .ok_or_else(|| PaymentError::PaymentNotFound(intent_id.to_string()))?;

        match intent.status {
            IntentStatus::Succeeded => {
                let method = intent.payment_method.as_deref().unwrap_or("card");
                let transaction_fee = fees::transaction_fee(method, record.amount);
                let net_amount = fees::net_amount(method, record.amount);

                let mut batch = WriteBatch::new();
                batch.update(
                    collections::PAYMENTS,
                    record.id.clone(),
                    vec![
                        ("status".to_string(), FieldOp::Set(json!(PaymentState::Paid.as_str()))),
                        ("paidAt".to_string(), FieldOp::ServerTimestamp),
                        ("paymentMethod".to_string(), FieldOp::Set(json!(method))),
                        ("transactionFee".to_string(), FieldOp::Set(json!(transaction_fee))),
                        ("netAmount".to_string(), FieldOp::Set(json!(net_amount))),
                        ("updatedAt".to_string(), FieldOp::ServerTimestamp),
                    ],
                );

                // The delivery may have been purged by admin tooling; in that
                // case the payment still settles on its own.
                match self.store.get(collections::DELIVERIES, &record.delivery_id).await? {
                    Some(_) => {
                        batch.update(
                            collections::DELIVERIES,
                            record.delivery_id.clone(),
                            vec![
                                (
                                    "paymentStatus".to_string(),
                                    FieldOp::Set(json!(PaymentState::Paid.as_str())),
                                ),
                                ("updatedAt".to_string(), FieldOp::ServerTimestamp),
                            ],
                        );
                    }
                    None => {
                        warn!(
                            payment_id = %record.id,
                            delivery_id = %record.delivery_id,
                            "delivery missing while settling payment"
                        );
                    }
                }

                self.store.commit(batch).await?;

                if let Err(err) = self.reconcile_client_payment_status(&record.client_id).await {
                    warn!(
                        client_id = %record.client_id,
                        error = %err,
                        "post-payment reconciliation failed"
                    );
                }

                info!(
                    payment_id = %record.id,
                    intent_id = %intent_id,
                    net_amount,
                    "payment settled"
                );

                Ok(CompletionOutcome::Paid {
                    payment_id: record.id,
                    transaction_fee,
                    net_amount,
                })
            }
            IntentStatus::Failed => {
                let reason = intent
                    .last_payment_error
                    .unwrap_or_else(|| "payment failed at gateway".to_string());

                self.store
                    .update(
                        collections::PAYMENTS,
                        &record.id,
                        vec![
                            (
                                "status".to_string(),
                                FieldOp::Set(json!(PaymentState::Failed.as_str())),
                            ),
                            ("failureReason".to_string(), FieldOp::Set(json!(reason))),
                            ("updatedAt".to_string(), FieldOp::ServerTimestamp),
                        ],
                    )
                    .await?;

                Ok(CompletionOutcome::Failed {
                    payment_id: record.id,
                    reason,
                })
            }
            status => Ok(CompletionOutcome::Ignored { status }),
        }
    }
}

/// In-memory gateway used by tests and the default wiring. Intents are held
/// in a map so webhook-style flows can observe state set up earlier.
#[derive(Default)]
pub struct MockGateway {
    intents: std::sync::Mutex<std::collections::HashMap<String, PaymentIntent>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the payer completing checkout with the given method.
    pub fn mark_succeeded(&self, intent_id: &str, method: &str) {
        let mut intents = self.intents.lock().unwrap();
        if let Some(intent) = intents.get_mut(intent_id) {
            intent.status = IntentStatus::Succeeded;
            intent.payment_method = Some(method.to_string());
        }
    }

    /// Simulate a gateway-side decline.
    pub fn mark_failed(&self, intent_id: &str, reason: &str) {
        let mut intents = self.intents.lock().unwrap();
        if let Some(intent) = intents.get_mut(intent_id) {
            intent.status = IntentStatus::Failed;
            intent.last_payment_error = Some(reason.to_string());
        }
    }
}

#[async_trait::async_trait]
impl PaymentGateway for MockGateway {
    async fn create_intent(
        &self,
        amount: f64,
        currency: &str,
        metadata: Value,
    ) -> Result<PaymentIntent, GatewayError> {
        let intent = PaymentIntent {
            id: format!("pi_{}", Uuid::new_v4().simple()),
            amount,
            currency: currency.to_string(),
            status: IntentStatus::AwaitingPaymentMethod,
            payment_method: None,
            client_secret: Some(format!("cs_{}", Uuid::new_v4().simple())),
            last_payment_error: None,
            metadata,
            created_at: Utc::now(),
        };
        self.intents
            .lock()
            .unwrap()
            .insert(intent.id.clone(), intent.clone());
        Ok(intent)
    }

    async fn get_intent(&self, intent_id: &str) -> Result<PaymentIntent, GatewayError> {
        self.intents
            .lock()
            .unwrap()
            .get(intent_id)
            .cloned()
            .ok_or_else(|| GatewayError::Rejected(format!("no such intent: {intent_id}")))
    }

    async fn cancel_intent(&self, intent_id: &str) -> Result<PaymentIntent, GatewayError> {
        let mut intents = self.intents.lock().unwrap();
        let intent = intents
            .get_mut(intent_id)
            .ok_or_else(|| GatewayError::Rejected(format!("no such intent: {intent_id}")))?;
        if intent.status == IntentStatus::Succeeded {
            return Err(GatewayError::Rejected("intent already captured".to_string()));
        }
        intent.status = IntentStatus::Cancelled;
        Ok(intent.clone())
    }

    async fn create_source(
        &self,
        attrs: SourceAttributes,
    ) -> Result<PaymentSource, GatewayError> {
        Ok(PaymentSource {
            id: format!("src_{}", Uuid::new_v4().simple()),
            status: SourceStatus::Pending,
            redirect_url: Some(format!(
                "https://gateway.test/redirect?type={}&amount={}",
                attrs.source_type, attrs.amount
            )),
        })
    }

    async fn get_source(&self, source_id: &str) -> Result<PaymentSource, GatewayError> {
        Ok(PaymentSource {
            id: source_id.to_string(),
            status: SourceStatus::Chargeable,
            redirect_url: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartage_store::MemoryStore;
    use chrono::Duration;

    fn rules() -> PaymentRules {
        PaymentRules::default()
    }

    fn delivery_fixture(id: &str, client: &str) -> Delivery {
        let mut delivery = Delivery::new(client, Some("truck-1".to_string()));
        delivery.id = id.to_string();
        delivery.rate = Some(1000.0);
        delivery
    }

    async fn seed(store: &MemoryStore, collection: &str, value: Value) {
        store.add(collection, value).await.unwrap();
    }

    fn synchronizer(store: Arc<MemoryStore>, gateway: Arc<MockGateway>) -> PaymentSynchronizer {
        PaymentSynchronizer::new(store, gateway, rules())
    }

    #[test]
    fn test_payment_view_excludes_cancelled() {
        let mut delivery = delivery_fixture("d1", "c1");
        delivery.status = DeliveryStatus::Cancelled;
        assert!(payment_view(&delivery, &rules(), Utc::now()).is_none());
    }

    #[test]
    fn test_payment_view_overdue_only_when_completed() {
        let now = Utc::now();
        let mut delivery = delivery_fixture("d1", "c1");
        delivery.due_date = Some(now - Duration::days(1));

        // Past due but still in flight: pending.
        delivery.status = DeliveryStatus::Started;
        let view = payment_view(&delivery, &rules(), now).unwrap();
        assert_eq!(view.status, PaymentState::Pending);

        delivery.status = DeliveryStatus::Completed;
        let view = payment_view(&delivery, &rules(), now).unwrap();
        assert_eq!(view.status, PaymentState::Overdue);

        delivery.payment_status = PaymentState::Paid;
        let view = payment_view(&delivery, &rules(), now).unwrap();
        assert_eq!(view.status, PaymentState::Paid);
    }

    #[test]
    fn test_payment_view_defaults_amount_and_due_date() {
        let mut delivery = delivery_fixture("d1", "c1");
        delivery.rate = None;
        let view = payment_view(&delivery, &rules(), Utc::now()).unwrap();
        assert_eq!(view.amount, rules().default_rate);
        assert_eq!(view.due_date, delivery.created_at + Duration::days(30));
    }

    #[tokio::test]
    async fn test_ensure_payment_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let sync = synchronizer(store.clone(), Arc::new(MockGateway::new()));
        let delivery = delivery_fixture("d1", "c1");
        seed(&store, collections::DELIVERIES, serde_json::to_value(&delivery).unwrap()).await;

        let first = sync.ensure_payment(&delivery).await.unwrap();
        let second = sync.ensure_payment(&delivery).await.unwrap();
        assert_eq!(first.id, second.id);

        let all = sync.payments_for_delivery("d1").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].amount, 1000.0);
    }

    #[tokio::test]
    async fn test_cancel_payment_spares_paid_records() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MockGateway::new());
        let sync = synchronizer(store.clone(), gateway);

        let mut delivery = delivery_fixture("d1", "c1");
        delivery.payment_status = PaymentState::Paid;
        seed(&store, collections::DELIVERIES, serde_json::to_value(&delivery).unwrap()).await;

        let paid = sync.ensure_payment(&delivery).await.unwrap();
        store
            .update(
                collections::PAYMENTS,
                &paid.id,
                vec![("status".to_string(), FieldOp::Set(json!("paid")))],
            )
            .await
            .unwrap();

        let cancelled = sync.cancel_payment("d1").await.unwrap();
        assert_eq!(cancelled, 0);

        let records = sync.payments_for_delivery("d1").await.unwrap();
        assert_eq!(records[0].status, PaymentState::Paid);

        // Paid delivery keeps its payment standing as well.
        let doc = store.get(collections::DELIVERIES, "d1").await.unwrap().unwrap();
        assert_eq!(doc["paymentStatus"], "paid");
    }

    #[tokio::test]
    async fn test_cancel_payment_marks_pending_records() {
        let store = Arc::new(MemoryStore::new());
        let sync = synchronizer(store.clone(), Arc::new(MockGateway::new()));

        let delivery = delivery_fixture("d1", "c1");
        seed(&store, collections::DELIVERIES, serde_json::to_value(&delivery).unwrap()).await;
        sync.ensure_payment(&delivery).await.unwrap();

        let cancelled = sync.cancel_payment("d1").await.unwrap();
        assert_eq!(cancelled, 1);

        let records = sync.payments_for_delivery("d1").await.unwrap();
        assert_eq!(records[0].status, PaymentState::Cancelled);

        let doc = store.get(collections::DELIVERIES, "d1").await.unwrap().unwrap();
        assert_eq!(doc["paymentStatus"], "cancelled");
    }

    #[tokio::test]
    async fn test_reconcile_marks_overdue_and_gates_booking() {
        let store = Arc::new(MemoryStore::new());
        let sync = synchronizer(store.clone(), Arc::new(MockGateway::new()));

        seed(&store, collections::CLIENTS, json!({ "id": "c1", "name": "Acme Hauling" })).await;

        let mut delivery = delivery_fixture("d1", "c1");
        delivery.due_date = Some(Utc::now() - Duration::days(1));
        seed(&store, collections::DELIVERIES, serde_json::to_value(&delivery).unwrap()).await;
        sync.ensure_payment(&delivery).await.unwrap();

        let result = sync.reconcile_client_payment_status("c1").await.unwrap();
        assert_eq!(result.overdue_count, 1);
        assert!(!result.can_book_trucks);

        let records = sync.payments_for_delivery("d1").await.unwrap();
        assert_eq!(records[0].status, PaymentState::Overdue);

        let client = store.get(collections::CLIENTS, "c1").await.unwrap().unwrap();
        assert_eq!(client["paymentStatus"], "overdue");
        assert_eq!(client["canBookTrucks"], false);
    }

    #[tokio::test]
    async fn test_reconcile_clears_gate_when_nothing_overdue() {
        let store = Arc::new(MemoryStore::new());
        let sync = synchronizer(store.clone(), Arc::new(MockGateway::new()));

        seed(&store, collections::CLIENTS, json!({ "id": "c1" })).await;

        let mut delivery = delivery_fixture("d1", "c1");
        delivery.due_date = Some(Utc::now() + Duration::days(10));
        seed(&store, collections::DELIVERIES, serde_json::to_value(&delivery).unwrap()).await;
        sync.ensure_payment(&delivery).await.unwrap();

        let result = sync.reconcile_client_payment_status("c1").await.unwrap();
        assert_eq!(result.overdue_count, 0);
        assert!(result.can_book_trucks);

        let client = store.get(collections::CLIENTS, "c1").await.unwrap().unwrap();
        assert_eq!(client["paymentStatus"], "current");
        assert_eq!(client["canBookTrucks"], true);
    }

    #[tokio::test]
    async fn test_gateway_completion_card_fee_math() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MockGateway::new());
        let sync = PaymentSynchronizer::new(store.clone(), gateway.clone(), rules());

        seed(&store, collections::CLIENTS, json!({ "id": "c1" })).await;
        let delivery = delivery_fixture("d1", "c1");
        seed(&store, collections::DELIVERIES, serde_json::to_value(&delivery).unwrap()).await;

        let (record, intent) = sync.initialize_gateway_payment(&delivery).await.unwrap();
        gateway.mark_succeeded(&intent.id, "card");

        let outcome = sync.process_gateway_completion(&intent.id).await.unwrap();
        match outcome {
            CompletionOutcome::Paid {
                transaction_fee,
                net_amount,
                ..
            } => {
                assert_eq!(transaction_fee, 35.0);
                assert_eq!(net_amount, 965.0);
            }
            other => panic!("expected Paid outcome, got {:?}", other),
        }

        let records = sync.payments_for_delivery("d1").await.unwrap();
        assert_eq!(records[0].status, PaymentState::Paid);
        assert_eq!(records[0].id, record.id);
        assert!(records[0].paid_at.is_some());

        let doc = store.get(collections::DELIVERIES, "d1").await.unwrap().unwrap();
        assert_eq!(doc["paymentStatus"], "paid");
    }

    #[tokio::test]
    async fn test_gateway_completion_ewallet_fee_math() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MockGateway::new());
        let sync = PaymentSynchronizer::new(store.clone(), gateway.clone(), rules());

        seed(&store, collections::CLIENTS, json!({ "id": "c1" })).await;
        let delivery = delivery_fixture("d1", "c1");
        seed(&store, collections::DELIVERIES, serde_json::to_value(&delivery).unwrap()).await;

        let (_, intent) = sync.initialize_gateway_payment(&delivery).await.unwrap();
        gateway.mark_succeeded(&intent.id, "gcash");

        let outcome = sync.process_gateway_completion(&intent.id).await.unwrap();
        match outcome {
            CompletionOutcome::Paid {
                transaction_fee,
                net_amount,
                ..
            } => {
                assert_eq!(transaction_fee, 25.0);
                assert_eq!(net_amount, 975.0);
            }
            other => panic!("expected Paid outcome, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_gateway_failure_leaves_delivery_untouched() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MockGateway::new());
        let sync = PaymentSynchronizer::new(store.clone(), gateway.clone(), rules());

        let delivery = delivery_fixture("d1", "c1");
        seed(&store, collections::DELIVERIES, serde_json::to_value(&delivery).unwrap()).await;

        let (_, intent) = sync.initialize_gateway_payment(&delivery).await.unwrap();
        gateway.mark_failed(&intent.id, "insufficient funds");

        let outcome = sync.process_gateway_completion(&intent.id).await.unwrap();
        match outcome {
            CompletionOutcome::Failed { reason, .. } => {
                assert_eq!(reason, "insufficient funds");
            }
            other => panic!("expected Failed outcome, got {:?}", other),
        }

        let records = sync.payments_for_delivery("d1").await.unwrap();
        assert_eq!(records[0].status, PaymentState::Failed);

        let doc = store.get(collections::DELIVERIES, "d1").await.unwrap().unwrap();
        assert_eq!(doc["paymentStatus"], "pending");
    }
}
