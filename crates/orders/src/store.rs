//! Storage contracts for orders and the idempotency log.

use async_trait::async_trait;
use common::{CustomerId, IdempotencyKey, OrderId};
use outbox::OutboxRecord;

use crate::error::Result;
use crate::idempotency::IdempotencyRecord;
use crate::order::{Order, OrderStatus};

/// Order persistence.
///
/// `create_with_event` is the atomicity boundary of intake: the order,
/// its items, and the outbox record commit together or not at all.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists an order and its outbox event atomically.
    ///
    /// Fails with [`crate::OrderError::DuplicateKey`] when another order
    /// already holds the idempotency key.
    async fn create_with_event(&self, order: &Order, event: &OutboxRecord) -> Result<()>;

    /// Fetches one order with its items.
    async fn get(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Lists a customer's orders, newest first.
    async fn list_for_customer(
        &self,
        customer_id: CustomerId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Order>>;

    /// Moves an order to a new status, enforcing the transition rules
    /// under a row lock.
    async fn update_status(&self, order_id: OrderId, status: OrderStatus) -> Result<Order>;
}

/// The idempotency log: key to captured response.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Looks up a live record. Expired entries are treated as absent.
    async fn get(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyRecord>>;

    /// Stores a record, replacing any expired entry under the same key.
    async fn put(&self, record: &IdempotencyRecord) -> Result<()>;

    /// Deletes expired entries, returning how many were removed.
    async fn purge_expired(&self) -> Result<u64>;
}
