use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    AwaitingPaymentMethod,
    AwaitingNextAction,
    Processing,
    Succeeded,
    Failed,
    Cancelled,
}

/// A payment intent as reported by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub amount: f64,
    pub currency: String,
    pub status: IntentStatus,
    /// Payment method the payer selected, once known (e.g. "card", "gcash").
    pub payment_method: Option<String>,
    pub client_secret: Option<String>,
    pub last_payment_error: Option<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Pending,
    Chargeable,
    Consumed,
    Expired,
    Cancelled,
}

/// A redirect-based payment source (e-wallet checkout).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSource {
    pub id: String,
    pub status: SourceStatus,
    pub redirect_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceAttributes {
    pub amount: f64,
    pub currency: String,
    pub source_type: String,
    pub success_url: String,
    pub failed_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Request(String),

    #[error("gateway rejected the operation: {0}")]
    Rejected(String),
}

/// Client contract for the external payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(
        &self,
        amount: f64,
        currency: &str,
        metadata: Value,
    ) -> Result<PaymentIntent, GatewayError>;

    async fn get_intent(&self, intent_id: &str) -> Result<PaymentIntent, GatewayError>;

    async fn cancel_intent(&self, intent_id: &str) -> Result<PaymentIntent, GatewayError>;

    async fn create_source(
        &self,
        attrs: SourceAttributes,
    ) -> Result<PaymentSource, GatewayError>;

    async fn get_source(&self, source_id: &str) -> Result<PaymentSource, GatewayError>;
}
