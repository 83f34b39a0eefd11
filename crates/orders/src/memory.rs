//! In-memory stores for tests and single-process deployments.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{CustomerId, IdempotencyKey, OrderId};
use outbox::{InMemoryOutbox, OutboxRecord};
use tokio::sync::Mutex;

use crate::error::{OrderError, Result};
use crate::idempotency::IdempotencyRecord;
use crate::order::{Order, OrderStatus};
use crate::store::{IdempotencyStore, OrderStore};

/// In-memory order store sharing an [`InMemoryOutbox`] with the relay.
///
/// Mirrors the Postgres transaction semantics: an outbox insert failure
/// leaves no order behind.
#[derive(Clone)]
pub struct InMemoryOrderStore {
    orders: Arc<Mutex<HashMap<OrderId, Order>>>,
    keys: Arc<Mutex<HashMap<IdempotencyKey, OrderId>>>,
    outbox: InMemoryOutbox,
}

impl InMemoryOrderStore {
    /// Creates a store wired to the given outbox handle.
    pub fn new(outbox: InMemoryOutbox) -> Self {
        Self {
            orders: Arc::new(Mutex::new(HashMap::new())),
            keys: Arc::new(Mutex::new(HashMap::new())),
            outbox,
        }
    }

    /// The shared outbox handle, for wiring the relay in tests.
    pub fn outbox(&self) -> &InMemoryOutbox {
        &self.outbox
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create_with_event(&self, order: &Order, event: &OutboxRecord) -> Result<()> {
        let mut keys = self.keys.lock().await;
        if keys.contains_key(&order.idempotency_key) {
            return Err(OrderError::DuplicateKey(
                order.idempotency_key.as_str().to_string(),
            ));
        }

        let mut orders = self.orders.lock().await;
        orders.insert(order.order_id, order.clone());

        // Nothing commits if the outbox rejects the event.
        if let Err(e) = self.outbox.insert(event.clone()) {
            orders.remove(&order.order_id);
            return Err(e.into());
        }

        keys.insert(order.idempotency_key.clone(), order.order_id);
        Ok(())
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.lock().await.get(&order_id).cloned())
    }

    async fn list_for_customer(
        &self,
        customer_id: CustomerId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Order>> {
        let orders = self.orders.lock().await;
        let mut matching: Vec<Order> = orders
            .values()
            .filter(|o| o.customer_id == customer_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn update_status(&self, order_id: OrderId, status: OrderStatus) -> Result<Order> {
        let mut orders = self.orders.lock().await;
        let order = orders
            .get_mut(&order_id)
            .ok_or(OrderError::NotFound(order_id))?;

        if !order.status.can_transition_to(status) {
            return Err(OrderError::InvalidTransition {
                from: order.status,
                to: status,
            });
        }

        order.status = status;
        order.updated_at = Utc::now();
        Ok(order.clone())
    }
}

/// In-memory idempotency log.
#[derive(Clone, Default)]
pub struct InMemoryIdempotencyStore {
    records: Arc<Mutex<HashMap<IdempotencyKey, IdempotencyRecord>>>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn get(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyRecord>> {
        let records = self.records.lock().await;
        Ok(records.get(key).filter(|r| !r.is_expired()).cloned())
    }

    async fn put(&self, record: &IdempotencyRecord) -> Result<()> {
        let mut records = self.records.lock().await;
        // A live record wins; only an expired entry may be replaced.
        match records.get(&record.key) {
            Some(existing) if !existing.is_expired() => {}
            _ => {
                records.insert(record.key.clone(), record.clone());
            }
        }
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, r| !r.is_expired());
        Ok((before - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idempotency::StoredResponse;
    use common::{Money, ProductId};
    use crate::order::OrderItem;

    fn order(key: &str) -> Order {
        let now = Utc::now();
        Order {
            order_id: OrderId::new(),
            customer_id: CustomerId::new(),
            items: vec![OrderItem {
                product_id: ProductId::new("SKU-1"),
                quantity: 2,
                price: Money::from_cents(500),
            }],
            total_amount: Money::from_cents(1000),
            status: OrderStatus::Pending,
            idempotency_key: IdempotencyKey::new(key),
            created_at: now,
            updated_at: now,
        }
    }

    fn event(order: &Order) -> OutboxRecord {
        OutboxRecord::new(
            outbox::ORDER_CREATED,
            order.order_id.as_uuid(),
            serde_json::json!({"orderId": order.order_id}),
        )
    }

    #[tokio::test]
    async fn create_persists_order_and_event_together() {
        let store = InMemoryOrderStore::new(InMemoryOutbox::new());
        let o = order("k-1");
        store.create_with_event(&o, &event(&o)).await.unwrap();

        assert!(store.get(o.order_id).await.unwrap().is_some());
        assert_eq!(store.outbox().all_records().len(), 1);
    }

    #[tokio::test]
    async fn outbox_failure_rolls_back_the_order() {
        let outbox = InMemoryOutbox::new();
        let store = InMemoryOrderStore::new(outbox.clone());
        outbox.set_fail_on_insert(true);

        let o = order("k-1");
        let err = store.create_with_event(&o, &event(&o)).await.unwrap_err();
        assert!(matches!(err, OrderError::Outbox(_)));

        assert!(store.get(o.order_id).await.unwrap().is_none());
        assert!(outbox.all_records().is_empty());

        // The key is free again after the rollback.
        outbox.set_fail_on_insert(false);
        store.create_with_event(&o, &event(&o)).await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_key_is_rejected() {
        let store = InMemoryOrderStore::new(InMemoryOutbox::new());
        let first = order("same-key");
        store.create_with_event(&first, &event(&first)).await.unwrap();

        let second = order("same-key");
        let err = store
            .create_with_event(&second, &event(&second))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::DuplicateKey(_)));
    }

    #[tokio::test]
    async fn invalid_transition_is_rejected() {
        let store = InMemoryOrderStore::new(InMemoryOutbox::new());
        let o = order("k-1");
        store.create_with_event(&o, &event(&o)).await.unwrap();

        store
            .update_status(o.order_id, OrderStatus::Confirmed)
            .await
            .unwrap();
        let err = store
            .update_status(o.order_id, OrderStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn list_is_newest_first_and_paginated() {
        let store = InMemoryOrderStore::new(InMemoryOutbox::new());
        let customer = CustomerId::new();
        let mut ids = Vec::new();
        for i in 0..3 {
            let mut o = order(&format!("k-{i}"));
            o.customer_id = customer;
            o.created_at = Utc::now() + chrono::Duration::milliseconds(i);
            ids.push(o.order_id);
            store.create_with_event(&o, &event(&o)).await.unwrap();
        }

        let page = store.list_for_customer(customer, 2, 0).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].order_id, ids[2]);

        let rest = store.list_for_customer(customer, 2, 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].order_id, ids[0]);
    }

    fn idem_record(key: &str, hash: &str, ttl: chrono::Duration) -> IdempotencyRecord {
        IdempotencyRecord::new(
            IdempotencyKey::new(key),
            hash.to_string(),
            StoredResponse {
                status: 201,
                payload: serde_json::json!({"hash": hash}),
            },
            ttl,
        )
    }

    #[tokio::test]
    async fn idempotency_store_hides_expired_records() {
        let store = InMemoryIdempotencyStore::new();
        let record = idem_record("k", "h", chrono::Duration::seconds(-1));
        store.put(&record).await.unwrap();

        assert!(store.get(&record.key).await.unwrap().is_none());
        assert_eq!(store.purge_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn put_never_replaces_a_live_record() {
        let store = InMemoryIdempotencyStore::new();
        store
            .put(&idem_record("k", "h-1", chrono::Duration::hours(24)))
            .await
            .unwrap();
        store
            .put(&idem_record("k", "h-2", chrono::Duration::hours(24)))
            .await
            .unwrap();

        let got = store.get(&IdempotencyKey::new("k")).await.unwrap().unwrap();
        assert_eq!(got.request_hash, "h-1");
    }

    #[tokio::test]
    async fn put_replaces_an_expired_record() {
        let store = InMemoryIdempotencyStore::new();
        store
            .put(&idem_record("k", "h-1", chrono::Duration::seconds(-1)))
            .await
            .unwrap();
        store
            .put(&idem_record("k", "h-2", chrono::Duration::hours(24)))
            .await
            .unwrap();

        let got = store.get(&IdempotencyKey::new("k")).await.unwrap().unwrap();
        assert_eq!(got.request_hash, "h-2");
    }
}
