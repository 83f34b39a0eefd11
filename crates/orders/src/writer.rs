//! Order intake, the write path behind `POST /orders`.

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{IdempotencyKey, Money, OrderId};
use outbox::{ORDER_CREATED, OutboxRecord};

use crate::error::{OrderError, Result};
use crate::idempotency::{IdempotencyRecord, StoredResponse, request_hash};
use crate::order::{NewOrder, Order, OrderItem, OrderStatus};
use crate::store::{IdempotencyStore, OrderStore};

/// Result of an intake attempt.
#[derive(Debug, Clone)]
pub struct CreateOutcome {
    pub order_id: OrderId,
    /// The exact response to send: for a replay this is byte-identical
    /// to what the first request returned.
    pub response: StoredResponse,
    pub replayed: bool,
}

/// Creates orders exactly once per idempotency key.
///
/// Validation and pricing happen before any state changes. The order and
/// its outbox event commit atomically through the store; the idempotency
/// record is written afterwards on a best-effort basis, with the unique
/// key constraint in the store as the backstop for the write race.
pub struct OrderWriter<S, I> {
    store: Arc<S>,
    idempotency: Arc<I>,
    ttl: Duration,
}

impl<S: OrderStore, I: IdempotencyStore> OrderWriter<S, I> {
    /// Creates a writer with the given idempotency record lifetime.
    pub fn new(store: Arc<S>, idempotency: Arc<I>, ttl: Duration) -> Self {
        Self {
            store,
            idempotency,
            ttl,
        }
    }

    /// Handles one intake request.
    pub async fn create(&self, request: NewOrder) -> Result<CreateOutcome> {
        let key = request
            .idempotency_key
            .clone()
            .unwrap_or_else(IdempotencyKey::generate);
        let hash = request_hash(&serde_json::to_value(&request)?);

        if let Some(outcome) = self.replay(&key, &hash).await? {
            return Ok(outcome);
        }

        request.validate().map_err(OrderError::Validation)?;

        let items: Vec<OrderItem> = request
            .items
            .iter()
            .map(|i| OrderItem {
                product_id: i.product_id.clone(),
                quantity: i.quantity,
                price: i.price,
            })
            .collect();
        let total: Money = items.iter().map(OrderItem::line_total).sum();

        let now = Utc::now();
        let order = Order {
            order_id: OrderId::new(),
            customer_id: request.customer_id,
            items,
            total_amount: total,
            status: OrderStatus::Pending,
            idempotency_key: key.clone(),
            created_at: now,
            updated_at: now,
        };

        let payload = serde_json::to_value(&order)?;
        let event = OutboxRecord::new(ORDER_CREATED, order.order_id.as_uuid(), payload.clone());

        match self.store.create_with_event(&order, &event).await {
            Ok(()) => {}
            Err(OrderError::DuplicateKey(dup)) => {
                // Lost the race to a concurrent request with the same key.
                // Its response may already be in the log.
                if let Some(outcome) = self.replay(&key, &hash).await? {
                    return Ok(outcome);
                }
                return Err(OrderError::DuplicateKey(dup));
            }
            Err(e) => return Err(e),
        }

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(
            order_id = %order.order_id,
            customer_id = %order.customer_id,
            total = %order.total_amount,
            "order created"
        );

        let response = StoredResponse {
            status: 201,
            payload,
        };
        let record = IdempotencyRecord::new(key, hash, response.clone(), self.ttl);
        if let Err(e) = self.idempotency.put(&record).await {
            // The order is committed; a missing log entry only costs a
            // DuplicateKey on retry instead of a clean replay.
            tracing::warn!(order_id = %order.order_id, error = %e, "failed to store idempotency record");
        }

        Ok(CreateOutcome {
            order_id: order.order_id,
            response,
            replayed: false,
        })
    }

    async fn replay(&self, key: &IdempotencyKey, hash: &str) -> Result<Option<CreateOutcome>> {
        let Some(record) = self.idempotency.get(key).await? else {
            return Ok(None);
        };

        if record.request_hash != hash {
            return Err(OrderError::Validation(format!(
                "idempotency key {key} was already used with a different request body"
            )));
        }

        let order_id = record
            .response
            .payload
            .get("orderId")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<uuid::Uuid>().ok())
            .map(OrderId::from_uuid)
            .ok_or_else(|| {
                OrderError::Validation("stored idempotency response is malformed".to_string())
            })?;

        metrics::counter!("orders_replayed_total").increment(1);
        tracing::info!(%key, %order_id, "replaying stored response for idempotent retry");

        Ok(Some(CreateOutcome {
            order_id,
            response: record.response,
            replayed: true,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryIdempotencyStore, InMemoryOrderStore};
    use common::{CustomerId, ProductId};
    use crate::order::NewOrderItem;
    use outbox::InMemoryOutbox;

    fn writer() -> OrderWriter<InMemoryOrderStore, InMemoryIdempotencyStore> {
        OrderWriter::new(
            Arc::new(InMemoryOrderStore::new(InMemoryOutbox::new())),
            Arc::new(InMemoryIdempotencyStore::new()),
            Duration::hours(24),
        )
    }

    fn request(key: Option<&str>) -> NewOrder {
        NewOrder {
            customer_id: CustomerId::from_uuid(uuid::Uuid::nil()),
            items: vec![
                NewOrderItem {
                    product_id: ProductId::new("SKU-1"),
                    quantity: 2,
                    price: Money::from_cents(1250),
                },
                NewOrderItem {
                    product_id: ProductId::new("SKU-2"),
                    quantity: 1,
                    price: Money::from_cents(300),
                },
            ],
            idempotency_key: key.map(IdempotencyKey::new),
        }
    }

    #[tokio::test]
    async fn create_prices_the_order_once() {
        let writer = writer();
        let outcome = writer.create(request(Some("k-1"))).await.unwrap();

        assert!(!outcome.replayed);
        assert_eq!(outcome.response.status, 201);
        assert_eq!(
            outcome.response.payload["totalAmount"],
            serde_json::json!(2800)
        );
        assert_eq!(outcome.response.payload["status"], "PENDING");
    }

    #[tokio::test]
    async fn retry_with_same_key_replays_identical_response() {
        let writer = writer();
        let first = writer.create(request(Some("k-1"))).await.unwrap();
        let second = writer.create(request(Some("k-1"))).await.unwrap();

        assert!(second.replayed);
        assert_eq!(second.order_id, first.order_id);
        assert_eq!(second.response, first.response);
    }

    #[tokio::test]
    async fn same_key_different_body_is_rejected() {
        let writer = writer();
        writer.create(request(Some("k-1"))).await.unwrap();

        let mut changed = request(Some("k-1"));
        changed.items[0].quantity = 99;
        let err = writer.create(changed).await.unwrap_err();
        assert!(matches!(err, OrderError::Validation(_)));
    }

    #[tokio::test]
    async fn missing_key_gets_generated_and_never_replays() {
        let writer = writer();
        let a = writer.create(request(None)).await.unwrap();
        let b = writer.create(request(None)).await.unwrap();
        assert_ne!(a.order_id, b.order_id);
    }

    #[tokio::test]
    async fn invalid_request_leaves_no_state() {
        let store = Arc::new(InMemoryOrderStore::new(InMemoryOutbox::new()));
        let writer = OrderWriter::new(
            store.clone(),
            Arc::new(InMemoryIdempotencyStore::new()),
            Duration::hours(24),
        );

        let mut bad = request(Some("k-1"));
        bad.items.clear();
        assert!(matches!(
            writer.create(bad).await,
            Err(OrderError::Validation(_))
        ));
        assert!(store.outbox().all_records().is_empty());

        // The key was not consumed by the failed attempt.
        writer.create(request(Some("k-1"))).await.unwrap();
    }

    #[tokio::test]
    async fn outbox_failure_fails_the_whole_create() {
        let outbox = InMemoryOutbox::new();
        let store = Arc::new(InMemoryOrderStore::new(outbox.clone()));
        let idempotency = Arc::new(InMemoryIdempotencyStore::new());
        let writer = OrderWriter::new(store.clone(), idempotency.clone(), Duration::hours(24));

        outbox.set_fail_on_insert(true);
        assert!(writer.create(request(Some("k-1"))).await.is_err());
        assert!(
            idempotency
                .get(&IdempotencyKey::new("k-1"))
                .await
                .unwrap()
                .is_none()
        );

        outbox.set_fail_on_insert(false);
        let outcome = writer.create(request(Some("k-1"))).await.unwrap();
        assert!(!outcome.replayed);
        assert_eq!(outbox.all_records().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_key_without_log_entry_falls_back_to_error() {
        let outbox = InMemoryOutbox::new();
        let store = Arc::new(InMemoryOrderStore::new(outbox));
        let first_writer = OrderWriter::new(
            store.clone(),
            Arc::new(InMemoryIdempotencyStore::new()),
            Duration::hours(24),
        );
        first_writer.create(request(Some("k-1"))).await.unwrap();

        // A second instance with an empty log sees the key constraint
        // but has no response to replay.
        let second_writer = OrderWriter::new(
            store,
            Arc::new(InMemoryIdempotencyStore::new()),
            Duration::hours(24),
        );
        let err = second_writer.create(request(Some("k-1"))).await.unwrap_err();
        assert!(matches!(err, OrderError::DuplicateKey(_)));
    }
}
