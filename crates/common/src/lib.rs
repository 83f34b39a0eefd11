//! Shared types for the order fulfillment system.
//!
//! Typed identifiers prevent mixing up the various UUID-based keys that
//! flow between the order and inventory sides, and [`Money`] keeps all
//! amounts in integer cents.

mod money;
mod types;

pub use money::Money;
pub use types::{CustomerId, EventId, IdempotencyKey, OrderId, ProductId};
