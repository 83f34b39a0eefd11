use common::OrderId;
use thiserror::Error;

use crate::order::OrderStatus;

/// Errors from order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The request failed validation before any state changed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No order exists with the given ID.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// The requested status change is not allowed.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Another order already holds this idempotency key.
    #[error("Duplicate idempotency key: {0}")]
    DuplicateKey(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The outbox insert failed; the order must not commit.
    #[error(transparent)]
    Outbox(#[from] outbox::OutboxError),
}

/// Result type for order operations.
pub type Result<T> = std::result::Result<T, OrderError>;
