use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use cartage_dispatch::{LifecycleError, PaymentError};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    ValidationError(String),

    #[error("{0}")]
    AuthorizationError(String),

    #[error("{0}")]
    NotFoundError(String),

    #[error("Payment gateway error: {0}")]
    UpstreamGatewayError(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn from_lifecycle(err: LifecycleError) -> Self {
        match err {
            LifecycleError::NotFound(id) => {
                AppError::NotFoundError(format!("Delivery not found: {id}"))
            }
            LifecycleError::InvalidTransition { from, to } => AppError::ValidationError(format!(
                "Invalid status transition from {from} to {to}"
            )),
            LifecycleError::Payment(inner) => AppError::from_payment(inner),
            other => AppError::Internal(other.into()),
        }
    }

    pub fn from_payment(err: PaymentError) -> Self {
        match err {
            PaymentError::DeliveryNotFound(id) => {
                AppError::NotFoundError(format!("Delivery not found: {id}"))
            }
            PaymentError::PaymentNotFound(id) => {
                AppError::NotFoundError(format!("No payment recorded for intent: {id}"))
            }
            PaymentError::Gateway(inner) => AppError::UpstreamGatewayError(inner.to_string()),
            other => AppError::Internal(other.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::UpstreamGatewayError(msg) => {
                tracing::error!("Upstream gateway error: {}", msg);
                (StatusCode::BAD_GATEWAY, msg)
            }
            AppError::Internal(err) => {
                tracing::error!("Internal Server Error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "success": false,
            "message": message,
        }));

        (status, body).into_response()
    }
}
