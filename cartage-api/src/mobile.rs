use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use cartage_core::store::{DocumentStore, FieldOp};
use cartage_dispatch::models::collections;
use cartage_dispatch::{DeliveryStatus, GeoPoint, TransitionOutcome};

use crate::error::AppError;
use crate::response::ApiResponse;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/mobile/deliveries/{id}/status", post(update_status))
        .route("/api/mobile/deliveries/{id}/accept", post(accept_delivery))
        .route("/api/mobile/deliveries/{id}/start", post(start_delivery))
        .route("/api/mobile/deliveries/{id}/pickup", post(pickup_delivery))
        .route("/api/mobile/deliveries/{id}/deliver", post(deliver_delivery))
        .route("/api/mobile/deliveries/{id}/location", post(update_location))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateRequest {
    pub actor_id: String,
    pub status: String,
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRequest {
    pub actor_id: String,
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdateRequest {
    pub actor_id: String,
    pub location: GeoPoint,
}

async fn advance(
    state: &AppState,
    delivery_id: &str,
    actor_id: &str,
    target: DeliveryStatus,
    location: Option<GeoPoint>,
) -> Result<TransitionOutcome, AppError> {
    let result = state
        .coordinator
        .advance_status(delivery_id, actor_id, target, location)
        .await;

    let outcome = if result.is_ok() { "success" } else { "error" };
    state
        .metrics
        .delivery_transitions_total
        .with_label_values(&[target.as_str(), outcome])
        .inc();

    result.map_err(AppError::from_lifecycle)
}

fn transition_response(outcome: TransitionOutcome) -> Json<ApiResponse<serde_json::Value>> {
    Json(ApiResponse::ok(
        outcome.message.clone(),
        json!({ "status": outcome.status }),
    ))
}

/// POST /api/mobile/deliveries/{id}/status
/// Generic driver status update; unrecognized status values are rejected.
async fn update_status(
    State(state): State<AppState>,
    Path(delivery_id): Path<String>,
    Json(req): Json<StatusUpdateRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let target: DeliveryStatus = req
        .status
        .parse()
        .map_err(|_| AppError::ValidationError(format!("Unrecognized status: {}", req.status)))?;

    let outcome = advance(&state, &delivery_id, &req.actor_id, target, req.location).await?;
    Ok(transition_response(outcome))
}

/// POST /api/mobile/deliveries/{id}/accept
async fn accept_delivery(
    State(state): State<AppState>,
    Path(delivery_id): Path<String>,
    Json(req): Json<TransitionRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let outcome = advance(
        &state,
        &delivery_id,
        &req.actor_id,
        DeliveryStatus::Accepted,
        req.location,
    )
    .await?;
    Ok(transition_response(outcome))
}

/// POST /api/mobile/deliveries/{id}/start
async fn start_delivery(
    State(state): State<AppState>,
    Path(delivery_id): Path<String>,
    Json(req): Json<TransitionRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let outcome = advance(
        &state,
        &delivery_id,
        &req.actor_id,
        DeliveryStatus::Started,
        req.location,
    )
    .await?;
    Ok(transition_response(outcome))
}

/// POST /api/mobile/deliveries/{id}/pickup
async fn pickup_delivery(
    State(state): State<AppState>,
    Path(delivery_id): Path<String>,
    Json(req): Json<TransitionRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let outcome = advance(
        &state,
        &delivery_id,
        &req.actor_id,
        DeliveryStatus::PickedUp,
        req.location,
    )
    .await?;
    Ok(transition_response(outcome))
}

/// POST /api/mobile/deliveries/{id}/deliver
async fn deliver_delivery(
    State(state): State<AppState>,
    Path(delivery_id): Path<String>,
    Json(req): Json<TransitionRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let outcome = advance(
        &state,
        &delivery_id,
        &req.actor_id,
        DeliveryStatus::Delivered,
        req.location,
    )
    .await?;
    Ok(transition_response(outcome))
}

/// POST /api/mobile/deliveries/{id}/location
/// Location ping from the driver app's feed.
async fn update_location(
    State(state): State<AppState>,
    Path(delivery_id): Path<String>,
    Json(req): Json<LocationUpdateRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    state
        .store
        .get(collections::DELIVERIES, &delivery_id)
        .await
        .map_err(|err| AppError::Internal(err.into()))?
        .ok_or_else(|| AppError::NotFoundError(format!("Delivery not found: {delivery_id}")))?;

    state
        .store
        .update(
            collections::DELIVERIES,
            &delivery_id,
            vec![
                ("location".to_string(), FieldOp::Set(json!(req.location))),
                ("updatedAt".to_string(), FieldOp::ServerTimestamp),
            ],
        )
        .await
        .map_err(|err| AppError::Internal(err.into()))?;

    tracing::debug!(delivery_id = %delivery_id, actor_id = %req.actor_id, "location updated");

    Ok(Json(ApiResponse::ok(
        "Location updated successfully.",
        json!({ "location": req.location }),
    )))
}
