use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use cartage_core::store::{DocumentStore, QueryOp};
use cartage_dispatch::models::collections;
use cartage_dispatch::{Delivery, PaymentState};

use crate::error::AppError;
use crate::response::ApiResponse;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/payments/create", post(create_payment))
        .route("/api/payments/source", post(create_source))
        .route("/api/payments/source/{id}", get(get_source))
        .route("/api/payments/client/{id}/summary", get(client_summary))
        .route("/api/payments/client/{id}/reconcile", post(reconcile_client))
        .route("/api/payments/client/{id}/generate", post(generate_payments))
        .route("/api/payments/delivery/{id}/cancel", post(cancel_payment))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub delivery_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSourceRequest {
    pub delivery_id: String,
    pub source_type: String,
    pub success_url: String,
    pub failed_url: String,
}

async fn load_delivery(state: &AppState, delivery_id: &str) -> Result<Delivery, AppError> {
    let value = state
        .store
        .get(collections::DELIVERIES, delivery_id)
        .await
        .map_err(|err| AppError::Internal(err.into()))?
        .ok_or_else(|| AppError::NotFoundError(format!("Delivery not found: {delivery_id}")))?;
    serde_json::from_value(value).map_err(|err| AppError::Internal(err.into()))
}

/// POST /api/payments/create
/// Ensure a payment record and open a gateway intent for it.
async fn create_payment(
    State(state): State<AppState>,
    Json(req): Json<CreatePaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let delivery = load_delivery(&state, &req.delivery_id).await?;

    let (record, intent) = state
        .payments
        .initialize_gateway_payment(&delivery)
        .await
        .map_err(AppError::from_payment)?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(
            "Payment intent created.",
            json!({
                "paymentId": record.id,
                "intentId": intent.id,
                "clientSecret": intent.client_secret,
                "amount": record.amount,
                "currency": record.currency,
                "dueDate": record.due_date,
            }),
        )),
    ))
}

/// POST /api/payments/source
/// Open a redirect-based e-wallet checkout for a delivery's payment.
async fn create_source(
    State(state): State<AppState>,
    Json(req): Json<CreateSourceRequest>,
) -> Result<impl IntoResponse, AppError> {
    let delivery = load_delivery(&state, &req.delivery_id).await?;

    let (record, source) = state
        .payments
        .create_checkout_source(&delivery, &req.source_type, &req.success_url, &req.failed_url)
        .await
        .map_err(AppError::from_payment)?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(
            "Payment source created.",
            json!({
                "paymentId": record.id,
                "sourceId": source.id,
                "status": source.status,
                "redirectUrl": source.redirect_url,
            }),
        )),
    ))
}

/// GET /api/payments/source/{id}
async fn get_source(
    State(state): State<AppState>,
    Path(source_id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let source = state
        .payments
        .source_status(&source_id)
        .await
        .map_err(AppError::from_payment)?;

    Ok(Json(ApiResponse::ok(
        "Source retrieved.",
        json!({ "id": source.id, "status": source.status, "redirectUrl": source.redirect_url }),
    )))
}

/// GET /api/payments/client/{id}/summary
/// Billing summary across the client's non-cancelled deliveries.
async fn client_summary(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let docs = state
        .store
        .query(collections::DELIVERIES, "clientId", QueryOp::Eq, json!(client_id))
        .await
        .map_err(|err| AppError::Internal(err.into()))?;

    let now = Utc::now();
    let mut views = Vec::new();
    let mut total_due = 0.0;
    let mut total_paid = 0.0;
    let mut overdue_count = 0;

    for doc in docs {
        // Tolerate legacy documents that no longer parse.
        let Ok(delivery) = serde_json::from_value::<Delivery>(doc.data) else {
            continue;
        };
        if let Some(view) = state.payments.view_for(&delivery, now) {
            match view.status {
                PaymentState::Paid => total_paid += view.amount,
                PaymentState::Overdue => {
                    total_due += view.amount;
                    overdue_count += 1;
                }
                _ => total_due += view.amount,
            }
            views.push(view);
        }
    }

    Ok(Json(ApiResponse::ok(
        "Payment summary generated.",
        json!({
            "payments": views,
            "totalDue": total_due,
            "totalPaid": total_paid,
            "overdueCount": overdue_count,
        }),
    )))
}

/// POST /api/payments/client/{id}/reconcile
async fn reconcile_client(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let result = state
        .payments
        .reconcile_client_payment_status(&client_id)
        .await
        .map_err(AppError::from_payment)?;

    Ok(Json(ApiResponse::ok(
        "Client payment status reconciled.",
        serde_json::to_value(&result).map_err(|err| AppError::Internal(err.into()))?,
    )))
}

/// POST /api/payments/client/{id}/generate
/// Backfill payment records from the client's deliveries.
async fn generate_payments(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let created = state
        .payments
        .generate_from_deliveries(&client_id)
        .await
        .map_err(AppError::from_payment)?;

    Ok(Json(ApiResponse::ok(
        format!("{} payment(s) generated.", created.len()),
        json!({ "created": created }),
    )))
}

/// POST /api/payments/delivery/{id}/cancel
async fn cancel_payment(
    State(state): State<AppState>,
    Path(delivery_id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let cancelled = state
        .payments
        .cancel_payment(&delivery_id)
        .await
        .map_err(AppError::from_payment)?;

    Ok(Json(ApiResponse::ok(
        "Payments cancelled for delivery.",
        json!({ "cancelled": cancelled }),
    )))
}
