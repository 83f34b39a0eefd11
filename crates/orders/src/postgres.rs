//! PostgreSQL-backed order and idempotency stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CustomerId, IdempotencyKey, Money, OrderId, ProductId};
use outbox::OutboxRecord;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::error::{OrderError, Result};
use crate::idempotency::{IdempotencyRecord, StoredResponse};
use crate::order::{Order, OrderItem, OrderStatus};
use crate::store::{IdempotencyStore, OrderStore};

/// PostgreSQL-backed order store.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_order(row: &PgRow, items: Vec<OrderItem>) -> Result<Order> {
        let status_str: String = row.try_get("status")?;
        let status = OrderStatus::parse(&status_str)
            .ok_or_else(|| OrderError::Validation(format!("unknown status {status_str}")))?;

        Ok(Order {
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
            items,
            total_amount: Money::from_cents(row.try_get::<i64, _>("total_amount_cents")?),
            status,
            idempotency_key: IdempotencyKey::new(row.try_get::<String, _>("idempotency_key")?),
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        })
    }

    async fn fetch_items(
        &self,
        order_id: OrderId,
    ) -> std::result::Result<Vec<OrderItem>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, quantity, price_cents
            FROM order_items
            WHERE order_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(OrderItem {
                    product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
                    quantity: row.try_get::<i32, _>("quantity")? as u32,
                    price: Money::from_cents(row.try_get::<i64, _>("price_cents")?),
                })
            })
            .collect()
    }

    async fn insert_outbox(
        tx: &mut Transaction<'_, Postgres>,
        event: &OutboxRecord,
    ) -> std::result::Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO outbox (event_id, event_type, aggregate_id, payload, created_at, published)
            VALUES ($1, $2, $3, $4, $5, FALSE)
            "#,
        )
        .bind(event.event_id.as_uuid())
        .bind(&event.event_type)
        .bind(event.aggregate_id)
        .bind(&event.payload)
        .bind(event.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn create_with_event(&self, order: &Order, event: &OutboxRecord) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO orders
                (order_id, customer_id, total_amount_cents, status, idempotency_key,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(order.order_id.as_uuid())
        .bind(order.customer_id.as_uuid())
        .bind(order.total_amount.cents())
        .bind(order.status.as_str())
        .bind(order.idempotency_key.as_str())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            // The unique constraint on idempotency_key is what resolves
            // the race between two concurrent requests with the same key.
            if is_unique_violation(&e) {
                return Err(OrderError::DuplicateKey(
                    order.idempotency_key.as_str().to_string(),
                ));
            }
            return Err(e.into());
        }

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, position, product_id, quantity, price_cents)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(order.order_id.as_uuid())
            .bind(position as i32)
            .bind(item.product_id.as_str())
            .bind(item.quantity as i32)
            .bind(item.price.cents())
            .execute(&mut *tx)
            .await?;
        }

        Self::insert_outbox(&mut tx, event).await?;
        tx.commit().await?;

        tracing::info!(
            order_id = %order.order_id,
            event_id = %event.event_id,
            "order and outbox event committed"
        );
        Ok(())
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT order_id, customer_id, total_amount_cents, status, idempotency_key,
                   created_at, updated_at
            FROM orders
            WHERE order_id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let items = self.fetch_items(order_id).await?;
                Ok(Some(Self::row_to_order(&row, items)?))
            }
            None => Ok(None),
        }
    }

    async fn list_for_customer(
        &self,
        customer_id: CustomerId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, customer_id, total_amount_cents, status, idempotency_key,
                   created_at, updated_at
            FROM orders
            WHERE customer_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(customer_id.as_uuid())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let order_id = OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?);
            let items = self.fetch_items(order_id).await?;
            orders.push(Self::row_to_order(&row, items)?);
        }
        Ok(orders)
    }

    async fn update_status(&self, order_id: OrderId, status: OrderStatus) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT status FROM orders WHERE order_id = $1 FOR UPDATE")
            .bind(order_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(OrderError::NotFound(order_id))?;

        let current_str: String = row.try_get("status")?;
        let current = OrderStatus::parse(&current_str)
            .ok_or_else(|| OrderError::Validation(format!("unknown status {current_str}")))?;

        if !current.can_transition_to(status) {
            return Err(OrderError::InvalidTransition {
                from: current,
                to: status,
            });
        }

        sqlx::query(
            r#"
            UPDATE orders
            SET status = $1, updated_at = now()
            WHERE order_id = $2
            "#,
        )
        .bind(status.as_str())
        .bind(order_id.as_uuid())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(%order_id, from = %current, to = %status, "order status updated");
        self.get(order_id)
            .await?
            .ok_or(OrderError::NotFound(order_id))
    }
}

/// PostgreSQL-backed idempotency log.
#[derive(Clone)]
pub struct PostgresIdempotencyStore {
    pool: PgPool,
}

impl PostgresIdempotencyStore {
    /// Creates a new PostgreSQL idempotency store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdempotencyStore for PostgresIdempotencyStore {
    async fn get(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyRecord>> {
        let row = sqlx::query(
            r#"
            SELECT idempotency_key, request_hash, response_status, response_payload,
                   created_at, expires_at
            FROM idempotency_log
            WHERE idempotency_key = $1 AND expires_at > now()
            "#,
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(IdempotencyRecord {
                key: IdempotencyKey::new(row.try_get::<String, _>("idempotency_key")?),
                request_hash: row.try_get("request_hash")?,
                response: StoredResponse {
                    status: row.try_get::<i32, _>("response_status")? as u16,
                    payload: row.try_get("response_payload")?,
                },
                created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
                expires_at: row.try_get::<DateTime<Utc>, _>("expires_at")?,
            })
        })
        .transpose()
    }

    async fn put(&self, record: &IdempotencyRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO idempotency_log
                (idempotency_key, request_hash, response_status, response_payload,
                 created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (idempotency_key) DO UPDATE
            SET request_hash = EXCLUDED.request_hash,
                response_status = EXCLUDED.response_status,
                response_payload = EXCLUDED.response_payload,
                created_at = EXCLUDED.created_at,
                expires_at = EXCLUDED.expires_at
            WHERE idempotency_log.expires_at <= now()
            "#,
        )
        .bind(record.key.as_str())
        .bind(&record.request_hash)
        .bind(record.response.status as i32)
        .bind(&record.response.payload)
        .bind(record.created_at)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM idempotency_log WHERE expires_at <= now()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
