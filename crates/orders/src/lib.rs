//! Order intake.
//!
//! The [`OrderWriter`] is the single entry point for creating orders: it
//! enforces idempotency by client-supplied key, validates and prices the
//! request once, and commits the order together with its outbox event in
//! one atomic operation against the [`OrderStore`].

mod error;
mod idempotency;
mod memory;
mod order;
mod postgres;
mod store;
mod writer;

pub use error::{OrderError, Result};
pub use idempotency::{IdempotencyRecord, StoredResponse, request_hash};
pub use memory::{InMemoryIdempotencyStore, InMemoryOrderStore};
pub use order::{NewOrder, NewOrderItem, Order, OrderItem, OrderStatus};
pub use postgres::{PostgresIdempotencyStore, PostgresOrderStore};
pub use store::{IdempotencyStore, OrderStore};
pub use writer::{CreateOutcome, OrderWriter};
