//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use inventory::InventoryError;
use orders::OrderError;
use settlement::ClientError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// The request lost a concurrency race (version or status conflict).
    Conflict(String),
    /// An upstream dependency is unavailable.
    Unavailable(String),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        match &err {
            OrderError::Validation(_) => ApiError::BadRequest(err.to_string()),
            OrderError::NotFound(_) => ApiError::NotFound(err.to_string()),
            OrderError::InvalidTransition { .. } | OrderError::DuplicateKey(_) => {
                ApiError::Conflict(err.to_string())
            }
            OrderError::Database(_) | OrderError::Serialization(_) | OrderError::Outbox(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        match &err {
            InventoryError::ProductNotFound(_) => ApiError::NotFound(err.to_string()),
            InventoryError::InsufficientStock { .. } | InventoryError::InvalidQuantity(_) => {
                ApiError::BadRequest(err.to_string())
            }
            InventoryError::VersionConflict { .. } => ApiError::Conflict(err.to_string()),
            InventoryError::Database(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<ClientError> for ApiError {
    fn from(err: ClientError) -> Self {
        match &err {
            ClientError::Rejected { status, .. } => match *status {
                404 => ApiError::NotFound(err.to_string()),
                409 => ApiError::Conflict(err.to_string()),
                _ => ApiError::BadRequest(err.to_string()),
            },
            ClientError::Timeout | ClientError::Connection(_) | ClientError::CircuitOpen => {
                ApiError::Unavailable(err.to_string())
            }
            ClientError::Upstream { .. } => ApiError::Unavailable(err.to_string()),
        }
    }
}
