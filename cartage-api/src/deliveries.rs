use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use cartage_core::store::{DocumentStore, FieldOp};
use cartage_dispatch::models::collections;
use cartage_dispatch::{AssignmentOutcome, Delivery, DeliveryStatus, TruckStatus};

use crate::error::AppError;
use crate::response::ApiResponse;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/deliveries", post(create_delivery))
        .route("/api/deliveries/{id}", get(get_delivery))
        .route(
            "/api/deliveries/{id}/confirm-completion",
            post(confirm_completion),
        )
        .route("/api/deliveries/{id}/cancel", post(cancel_delivery))
        .route("/api/deliveries/{id}/assign-driver", post(assign_driver))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeliveryRequest {
    pub client_id: String,
    #[serde(default)]
    pub truck_id: Option<String>,
    #[serde(default)]
    pub helper_id: Option<String>,
    #[serde(default)]
    pub rate: Option<f64>,
    #[serde(default)]
    pub distance_km: Option<f64>,
    #[serde(default)]
    pub delivery_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorRequest {
    pub actor_id: String,
    #[serde(default)]
    pub role: Option<String>,
}

fn can_act_for_client(actor_id: &str, role: Option<&str>, client_id: &str) -> bool {
    matches!(role, Some("admin") | Some("operator")) || actor_id == client_id
}

/// POST /api/deliveries
/// Book a truck. Clients with overdue payments cannot book.
async fn create_delivery(
    State(state): State<AppState>,
    Json(req): Json<CreateDeliveryRequest>,
) -> Result<impl IntoResponse, AppError> {
    let client = state
        .store
        .get(collections::CLIENTS, &req.client_id)
        .await
        .map_err(|err| AppError::Internal(err.into()))?
        .ok_or_else(|| AppError::NotFoundError(format!("Client not found: {}", req.client_id)))?;

    if client["canBookTrucks"] == false {
        return Err(AppError::AuthorizationError(
            "Client has overdue payments and cannot book trucks".to_string(),
        ));
    }

    let mut delivery = Delivery::new(req.client_id.clone(), req.truck_id.clone());
    delivery.helper_id = req.helper_id;
    delivery.rate = req.rate;
    delivery.distance_km = req.distance_km.unwrap_or(0.0);
    delivery.delivery_date = req.delivery_date;

    let value =
        serde_json::to_value(&delivery).map_err(|err| AppError::Internal(err.into()))?;
    state
        .store
        .add(collections::DELIVERIES, value)
        .await
        .map_err(|err| AppError::Internal(err.into()))?;

    // Mark the truck as out on this haul. Booking still stands if the truck
    // document is missing.
    if let Some(truck_id) = &req.truck_id {
        let result = state
            .store
            .update(
                collections::TRUCKS,
                truck_id,
                vec![
                    (
                        "status".to_string(),
                        FieldOp::Set(json!(TruckStatus::OnDelivery.as_str())),
                    ),
                    ("activeDelivery".to_string(), FieldOp::Set(json!(true))),
                    (
                        "currentDeliveryId".to_string(),
                        FieldOp::Set(json!(delivery.id)),
                    ),
                    ("updatedAt".to_string(), FieldOp::ServerTimestamp),
                ],
            )
            .await;
        if let Err(err) = result {
            warn!(truck_id = %truck_id, error = %err, "failed to mark truck on delivery");
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(
            "Delivery booked successfully.",
            serde_json::to_value(&delivery).map_err(|err| AppError::Internal(err.into()))?,
        )),
    ))
}

/// GET /api/deliveries/{id}
async fn get_delivery(
    State(state): State<AppState>,
    Path(delivery_id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let delivery = state
        .store
        .get(collections::DELIVERIES, &delivery_id)
        .await
        .map_err(|err| AppError::Internal(err.into()))?
        .ok_or_else(|| AppError::NotFoundError(format!("Delivery not found: {delivery_id}")))?;

    Ok(Json(ApiResponse::ok("Delivery retrieved.", delivery)))
}

/// POST /api/deliveries/{id}/confirm-completion
/// Client or operator confirms a delivered haul.
async fn confirm_completion(
    State(state): State<AppState>,
    Path(delivery_id): Path<String>,
    Json(req): Json<ActorRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let delivery = load_delivery(&state, &delivery_id).await?;
    if !can_act_for_client(&req.actor_id, req.role.as_deref(), &delivery.client_id) {
        return Err(AppError::AuthorizationError(
            "Only the booking client or an operator can confirm completion".to_string(),
        ));
    }

    let outcome = state
        .coordinator
        .advance_status(&delivery_id, &req.actor_id, DeliveryStatus::Completed, None)
        .await
        .map_err(AppError::from_lifecycle)?;

    state
        .metrics
        .delivery_transitions_total
        .with_label_values(&[DeliveryStatus::Completed.as_str(), "success"])
        .inc();

    Ok(Json(ApiResponse::ok(
        outcome.message.clone(),
        json!({ "status": outcome.status }),
    )))
}

/// POST /api/deliveries/{id}/cancel
async fn cancel_delivery(
    State(state): State<AppState>,
    Path(delivery_id): Path<String>,
    Json(req): Json<ActorRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let delivery = load_delivery(&state, &delivery_id).await?;
    if !can_act_for_client(&req.actor_id, req.role.as_deref(), &delivery.client_id) {
        return Err(AppError::AuthorizationError(
            "Only the booking client or an operator can cancel a delivery".to_string(),
        ));
    }

    let outcome = state
        .coordinator
        .advance_status(&delivery_id, &req.actor_id, DeliveryStatus::Cancelled, None)
        .await
        .map_err(AppError::from_lifecycle)?;

    Ok(Json(ApiResponse::ok(
        outcome.message.clone(),
        json!({ "status": outcome.status }),
    )))
}

/// POST /api/deliveries/{id}/assign-driver
/// Assign a random active driver. An empty pool is a normal (non-error)
/// response.
async fn assign_driver(
    State(state): State<AppState>,
    Path(delivery_id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let outcome = state
        .coordinator
        .assign_random_driver(&delivery_id)
        .await
        .map_err(AppError::from_lifecycle)?;

    match outcome {
        AssignmentOutcome::Assigned {
            driver_id,
            driver_name,
        } => {
            state
                .metrics
                .driver_assignments_total
                .with_label_values(&["assigned"])
                .inc();
            Ok(Json(ApiResponse::ok(
                "Driver assigned successfully.",
                json!({ "driverId": driver_id, "driverName": driver_name }),
            )))
        }
        AssignmentOutcome::NoDriversAvailable => {
            state
                .metrics
                .driver_assignments_total
                .with_label_values(&["no_drivers"])
                .inc();
            Ok(Json(ApiResponse::failure(
                "No active drivers available for assignment",
            )))
        }
    }
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
