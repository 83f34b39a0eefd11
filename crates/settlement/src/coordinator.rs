//! The settlement coordinator: drives pending orders to their inventory
//! outcome.

use std::sync::Arc;

use inventory::StockDeduction;
use orders::{Order, OrderError, OrderStatus, OrderStore};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::client::InventoryClient;
use crate::error::ClientError;

/// How a settlement attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// Stock deducted, order confirmed.
    Confirmed,
    /// Deduction did not complete; the order awaits operator attention.
    PendingInventory { reason: String },
}

/// Settles orders against inventory with bounded concurrency.
///
/// Every accepted order reaches exactly one of `CONFIRMED` or
/// `PENDING_INVENTORY`; the deduction itself is all-or-nothing, so a
/// pending order never holds partial stock.
pub struct SettlementCoordinator<S> {
    store: Arc<S>,
    client: Arc<dyn InventoryClient>,
    permits: Arc<Semaphore>,
}

impl<S> Clone for SettlementCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            client: Arc::clone(&self.client),
            permits: Arc::clone(&self.permits),
        }
    }
}

impl<S: OrderStore + 'static> SettlementCoordinator<S> {
    /// Creates a coordinator allowing at most `max_concurrent` in-flight
    /// settlements.
    pub fn new(store: Arc<S>, client: Arc<dyn InventoryClient>, max_concurrent: usize) -> Self {
        Self {
            store,
            client,
            permits: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Settles one order synchronously.
    pub async fn settle(&self, order: &Order) -> Result<SettlementOutcome, OrderError> {
        let deductions: Vec<StockDeduction> = order
            .items
            .iter()
            .map(|item| StockDeduction::new(item.product_id.clone(), item.quantity))
            .collect();

        match self.client.deduct(order.order_id, &deductions).await {
            Ok(()) => {
                self.store
                    .update_status(order.order_id, OrderStatus::Confirmed)
                    .await?;
                metrics::counter!("orders_confirmed_total").increment(1);
                tracing::info!(order_id = %order.order_id, "order confirmed");
                Ok(SettlementOutcome::Confirmed)
            }
            Err(e) => {
                self.store
                    .update_status(order.order_id, OrderStatus::PendingInventory)
                    .await?;
                metrics::counter!("orders_pending_inventory_total").increment(1);
                match &e {
                    ClientError::Rejected { .. } => {
                        tracing::warn!(order_id = %order.order_id, error = %e, "inventory rejected order")
                    }
                    _ => {
                        tracing::error!(order_id = %order.order_id, error = %e, "inventory unavailable for order")
                    }
                }
                Ok(SettlementOutcome::PendingInventory {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Queues an order for settlement on the shared pool. The task waits
    /// for a permit, so at most `max_concurrent` settlements run at once.
    pub fn submit(&self, order: Order) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            let _permit = coordinator
                .permits
                .clone()
                .acquire_owned()
                .await
                .expect("settlement semaphore closed");

            if let Err(e) = coordinator.settle(&order).await {
                // A concurrent transition (e.g. cancellation) won the
                // race; the order is no longer ours to settle.
                tracing::warn!(order_id = %order.order_id, error = %e, "settlement skipped");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use common::{CustomerId, IdempotencyKey, Money, OrderId, ProductId};
    use inventory::{InMemoryLedger, InventoryLedger};
    use orders::{InMemoryOrderStore, OrderItem};
    use outbox::{InMemoryOutbox, ORDER_CREATED, OutboxRecord};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::client::LocalInventoryClient;

    fn order(quantity: u32) -> Order {
        let now = Utc::now();
        Order {
            order_id: OrderId::new(),
            customer_id: CustomerId::new(),
            items: vec![OrderItem {
                product_id: ProductId::new("SKU-1"),
                quantity,
                price: Money::from_cents(500),
            }],
            total_amount: Money::from_cents(500 * quantity as i64),
            status: OrderStatus::Pending,
            idempotency_key: IdempotencyKey::generate(),
            created_at: now,
            updated_at: now,
        }
    }

    async fn seeded(store: &InMemoryOrderStore, order: &Order) {
        let event = OutboxRecord::new(
            ORDER_CREATED,
            order.order_id.as_uuid(),
            serde_json::json!({}),
        );
        store.create_with_event(order, &event).await.unwrap();
    }

    async fn setup(stock: u32) -> (Arc<InMemoryOrderStore>, Arc<InMemoryLedger>, SettlementCoordinator<InMemoryOrderStore>) {
        let store = Arc::new(InMemoryOrderStore::new(InMemoryOutbox::new()));
        let ledger = Arc::new(InMemoryLedger::new());
        ledger
            .create_product(&ProductId::new("SKU-1"), "Widget", stock)
            .await
            .unwrap();
        let client = Arc::new(LocalInventoryClient::new(ledger.clone()));
        let coordinator = SettlementCoordinator::new(store.clone(), client, 4);
        (store, ledger, coordinator)
    }

    #[tokio::test]
    async fn successful_settlement_confirms_and_deducts() {
        let (store, ledger, coordinator) = setup(10).await;
        let o = order(3);
        seeded(&store, &o).await;

        let outcome = coordinator.settle(&o).await.unwrap();
        assert_eq!(outcome, SettlementOutcome::Confirmed);
        assert_eq!(
            store.get(o.order_id).await.unwrap().unwrap().status,
            OrderStatus::Confirmed
        );
        let item = ledger.get(&ProductId::new("SKU-1")).await.unwrap().unwrap();
        assert_eq!(item.stock_level, 7);
    }

    #[tokio::test]
    async fn shortfall_parks_the_order_without_deducting() {
        let (store, ledger, coordinator) = setup(2).await;
        let o = order(5);
        seeded(&store, &o).await;

        let outcome = coordinator.settle(&o).await.unwrap();
        assert!(matches!(outcome, SettlementOutcome::PendingInventory { .. }));
        assert_eq!(
            store.get(o.order_id).await.unwrap().unwrap().status,
            OrderStatus::PendingInventory
        );
        let item = ledger.get(&ProductId::new("SKU-1")).await.unwrap().unwrap();
        assert_eq!(item.stock_level, 2);
    }

    #[tokio::test]
    async fn concurrent_settlements_never_oversell() {
        let (store, ledger, coordinator) = setup(10).await;
        let coordinator = Arc::new(coordinator);

        let mut handles = Vec::new();
        for _ in 0..6 {
            let o = order(3);
            seeded(&store, &o).await;
            handles.push(coordinator.submit(o));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // 10 units cover three orders of 3; the rest are parked.
        let item = ledger.get(&ProductId::new("SKU-1")).await.unwrap().unwrap();
        assert_eq!(item.stock_level, 1);
    }

    struct CountingClient {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl InventoryClient for CountingClient {
        async fn deduct(&self, _: OrderId, _: &[StockDeduction]) -> Result<(), ClientError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn pool_bounds_in_flight_settlements() {
        let store = Arc::new(InMemoryOrderStore::new(InMemoryOutbox::new()));
        let client = Arc::new(CountingClient {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let coordinator = Arc::new(SettlementCoordinator::new(store.clone(), client.clone(), 2));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let o = order(1);
            seeded(&store, &o).await;
            handles.push(coordinator.submit(o));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(client.peak.load(Ordering::SeqCst) <= 2);
    }
}
