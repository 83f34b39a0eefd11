//! The inventory ledger contract.

use async_trait::async_trait;
use common::{OrderId, ProductId};

use crate::{InventoryItem, InventoryTransaction, Result, StockDeduction};

/// Concurrency-safe stock accounting.
///
/// Mutations to the same product are mutually exclusive through the
/// underlying store's locking (never in-process locks), so correctness
/// holds across multiple service instances. Every accepted mutation
/// appends one [`InventoryTransaction`] audit row in the same transaction.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Creates a product row with an initial stock level, or leaves an
    /// existing row untouched. Used for seeding and operator tooling.
    async fn create_product(
        &self,
        product_id: &ProductId,
        product_name: &str,
        initial_stock: u32,
    ) -> Result<InventoryItem>;

    /// Moves `quantity` units from available to reserved for `order_id`.
    ///
    /// Fails with `InsufficientStock` when fewer than `quantity` units are
    /// available, leaving the ledger untouched.
    async fn reserve(
        &self,
        product_id: &ProductId,
        quantity: u32,
        order_id: OrderId,
    ) -> Result<InventoryItem>;

    /// Deducts stock for every line of an order in one transaction.
    ///
    /// All items commit together or none do: a shortfall (or version
    /// conflict) on any line rolls back the deductions already applied to
    /// the others.
    async fn deduct(&self, order_id: OrderId, items: &[StockDeduction]) -> Result<()>;

    /// Unconditionally increments the stock level.
    async fn restock(&self, product_id: &ProductId, quantity: u32) -> Result<InventoryItem>;

    /// Reads a single product's stock snapshot.
    async fn get(&self, product_id: &ProductId) -> Result<Option<InventoryItem>>;

    /// Lists products ordered by name for stable pagination.
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<InventoryItem>>;

    /// Returns the audit trail for a product, newest first.
    async fn transactions_for(&self, product_id: &ProductId)
    -> Result<Vec<InventoryTransaction>>;
}
