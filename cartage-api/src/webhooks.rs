use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Deserialize;

use cartage_dispatch::CompletionOutcome;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/payments/webhook", post(handle_gateway_webhook))
}

#[derive(Debug, Deserialize)]
pub struct GatewayWebhook {
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub attributes: WebhookAttributes,
}

#[derive(Debug, Deserialize)]
pub struct WebhookAttributes {
    #[serde(rename = "type")]
    pub type_: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEventData {
    pub attributes: WebhookEventAttributes,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEventAttributes {
    #[serde(default)]
    pub payment_intent_id: Option<String>,
}

/// POST /api/payments/webhook
/// Receive payment status updates from the gateway.
async fn handle_gateway_webhook(
    State(state): State<AppState>,
    Json(payload): Json<GatewayWebhook>,
) -> Result<StatusCode, AppError> {
    let event_type = payload.data.attributes.type_.as_str();
    tracing::info!("Received gateway webhook: {}", event_type);

    if event_type != "payment.paid" && event_type != "payment.failed" {
        // Acknowledge everything else so the gateway stops retrying.
        state
            .metrics
            .payment_webhooks_total
            .with_label_values(&["ignored"])
            .inc();
        return Ok(StatusCode::OK);
    }

    let intent_id = payload
        .data
        .attributes
        .data
        .attributes
        .payment_intent_id
        .ok_or_else(|| {
            AppError::ValidationError("Webhook payload is missing payment_intent_id".to_string())
        })?;

    let outcome = state
        .payments
        .process_gateway_completion(&intent_id)
        .await
        .map_err(AppError::from_payment)?;

    let label = match &outcome {
        CompletionOutcome::Paid { .. } => "paid",
        CompletionOutcome::Failed { .. } => "failed",
        CompletionOutcome::Ignored { .. } => "ignored",
    };
    state
        .metrics
        .payment_webhooks_total
        .with_label_values(&[label])
        .inc();

    Ok(StatusCode::OK)
}
