use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{OrderId, ProductId};
use tokio::sync::Mutex;

use crate::{
    InventoryError, InventoryItem, InventoryLedger, InventoryTransaction, Result, StockDeduction,
    item::TransactionKind,
};

#[derive(Debug, Default)]
struct LedgerState {
    items: HashMap<ProductId, InventoryItem>,
    transactions: Vec<InventoryTransaction>,
}

/// In-memory ledger for tests and single-process deployments.
///
/// A single async mutex plays the role of the database's row locks: all
/// mutations are serialized, so the same invariants hold as in the
/// Postgres implementation (within one process).
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryLedger {
    /// Creates a new empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of audit rows written.
    pub async fn transaction_count(&self) -> usize {
        self.state.lock().await.transactions.len()
    }
}

#[async_trait]
impl InventoryLedger for InMemoryLedger {
    async fn create_product(
        &self,
        product_id: &ProductId,
        product_name: &str,
        initial_stock: u32,
    ) -> Result<InventoryItem> {
        let mut state = self.state.lock().await;
        let item = state
            .items
            .entry(product_id.clone())
            .or_insert_with(|| InventoryItem {
                product_id: product_id.clone(),
                product_name: product_name.to_string(),
                stock_level: initial_stock,
                reserved_stock: 0,
                version: 1,
                last_updated: Utc::now(),
            });
        Ok(item.clone())
    }

    async fn reserve(
        &self,
        product_id: &ProductId,
        quantity: u32,
        order_id: OrderId,
    ) -> Result<InventoryItem> {
        if quantity == 0 {
            return Err(InventoryError::InvalidQuantity(
                "reserve quantity must be positive".to_string(),
            ));
        }

        let mut state = self.state.lock().await;
        let item = state
            .items
            .get_mut(product_id)
            .ok_or_else(|| InventoryError::ProductNotFound(product_id.clone()))?;

        let available = item.stock_level - item.reserved_stock;
        if available < quantity {
            return Err(InventoryError::InsufficientStock {
                product_id: product_id.clone(),
                available,
                requested: quantity,
            });
        }

        item.reserved_stock += quantity;
        item.version += 1;
        item.last_updated = Utc::now();
        let snapshot = item.clone();
        let stock_level = snapshot.stock_level;

        state.transactions.push(InventoryTransaction::record(
            product_id.clone(),
            TransactionKind::Reserve,
            quantity,
            Some(order_id),
            stock_level,
            stock_level,
        ));

        metrics::counter!("inventory_reservations_total").increment(1);
        Ok(snapshot)
    }

    async fn deduct(&self, order_id: OrderId, items: &[StockDeduction]) -> Result<()> {
        let mut state = self.state.lock().await;

        // Validate every line before touching anything; the whole order
        // commits or none of it does.
        for deduction in items {
            let item = state
                .items
                .get(&deduction.product_id)
                .ok_or_else(|| InventoryError::ProductNotFound(deduction.product_id.clone()))?;

            if let Some(expected) = deduction.expected_version
                && item.version != expected
            {
                return Err(InventoryError::VersionConflict {
                    product_id: deduction.product_id.clone(),
                });
            }

            if item.stock_level < deduction.quantity {
                return Err(InventoryError::InsufficientStock {
                    product_id: deduction.product_id.clone(),
                    available: item.stock_level,
                    requested: deduction.quantity,
                });
            }
        }

        for deduction in items {
            let item = state
                .items
                .get_mut(&deduction.product_id)
                .expect("validated above");
            let previous_stock = item.stock_level;
            item.stock_level -= deduction.quantity;
            item.reserved_stock = item.reserved_stock.min(item.stock_level);
            item.version += 1;
            item.last_updated = Utc::now();
            let new_stock = item.stock_level;

            state.transactions.push(InventoryTransaction::record(
                deduction.product_id.clone(),
                TransactionKind::Deduct,
                deduction.quantity,
                Some(order_id),
                previous_stock,
                new_stock,
            ));
        }

        metrics::counter!("inventory_deductions_total").increment(1);
        Ok(())
    }

    async fn restock(&self, product_id: &ProductId, quantity: u32) -> Result<InventoryItem> {
        let mut state = self.state.lock().await;
        let item = state
            .items
            .get_mut(product_id)
            .ok_or_else(|| InventoryError::ProductNotFound(product_id.clone()))?;

        let previous_stock = item.stock_level;
        item.stock_level = previous_stock.checked_add(quantity).ok_or_else(|| {
            InventoryError::InvalidQuantity("restock overflows stock level".to_string())
        })?;
        item.version += 1;
        item.last_updated = Utc::now();
        let snapshot = item.clone();

        state.transactions.push(InventoryTransaction::record(
            product_id.clone(),
            TransactionKind::Restock,
            quantity,
            None,
            previous_stock,
            snapshot.stock_level,
        ));

        Ok(snapshot)
    }

    async fn get(&self, product_id: &ProductId) -> Result<Option<InventoryItem>> {
        Ok(self.state.lock().await.items.get(product_id).cloned())
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<InventoryItem>> {
        let state = self.state.lock().await;
        let mut items: Vec<_> = state.items.values().cloned().collect();
        items.sort_by(|a, b| a.product_name.cmp(&b.product_name));
        Ok(items
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn transactions_for(
        &self,
        product_id: &ProductId,
    ) -> Result<Vec<InventoryTransaction>> {
        let state = self.state.lock().await;
        let mut rows: Vec<_> = state
            .transactions
            .iter()
            .filter(|t| &t.product_id == product_id)
            .cloned()
            .collect();
        rows.reverse();
        Ok(rows)
    }
}
