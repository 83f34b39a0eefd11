//! Inventory settlement.
//!
//! After an order commits, the [`SettlementCoordinator`] deducts its
//! stock through an [`InventoryClient`]. The production client wraps the
//! call in a [`CircuitBreaker`] and a bounded-backoff [`RetryPolicy`] so
//! a failing inventory backend degrades to fast failures instead of
//! piling up blocked requests.

mod breaker;
mod client;
mod coordinator;
mod error;
mod retry;

pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker};
pub use client::{
    HttpInventoryClient, InventoryClient, LocalInventoryClient, ResilientInventoryClient,
};
pub use coordinator::{SettlementCoordinator, SettlementOutcome};
pub use error::ClientError;
pub use retry::RetryPolicy;
