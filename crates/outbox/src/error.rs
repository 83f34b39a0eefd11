use thiserror::Error;

/// Errors from outbox storage operations.
#[derive(Debug, Error)]
pub enum OutboxError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The record was already claimed or is unknown.
    #[error("Outbox record not claimed: {0}")]
    NotClaimed(common::EventId),

    /// The store is unavailable (used by test doubles for fault injection).
    #[error("Outbox unavailable: {0}")]
    Unavailable(String),
}

/// Errors from event bus publish attempts.
///
/// All variants leave the outbox row untouched; the relay retries on the
/// next cycle.
#[derive(Debug, Error)]
pub enum BusError {
    /// No bus is configured for this deployment.
    #[error("Event bus is disabled")]
    Disabled,

    /// Could not reach the broker.
    #[error("Event bus connection error: {0}")]
    Connection(String),

    /// The broker rejected or failed the publish.
    #[error("Event bus publish error: {0}")]
    Publish(String),
}

/// Result type for outbox operations.
pub type Result<T> = std::result::Result<T, OutboxError>;
