use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    InventoryError, InventoryItem, InventoryLedger, InventoryTransaction, Result, StockDeduction,
    item::TransactionKind,
};

/// PostgreSQL-backed inventory ledger.
///
/// Row-level mutual exclusion comes from `SELECT ... FOR UPDATE`; the
/// optimistic version guard (`WHERE version = $n`) catches lost updates
/// across service instances.
#[derive(Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    /// Creates a new PostgreSQL inventory ledger.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_item(row: PgRow) -> Result<InventoryItem> {
        Ok(InventoryItem {
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            product_name: row.try_get("product_name")?,
            stock_level: row.try_get::<i32, _>("stock_level")? as u32,
            reserved_stock: row.try_get::<i32, _>("reserved_stock")? as u32,
            version: row.try_get("version")?,
            last_updated: row.try_get::<DateTime<Utc>, _>("last_updated")?,
        })
    }

    fn row_to_transaction(row: PgRow) -> Result<InventoryTransaction> {
        let kind_str: String = row.try_get("transaction_type")?;
        let kind = TransactionKind::parse(&kind_str).ok_or_else(|| {
            InventoryError::InvalidQuantity(format!("unknown transaction type {kind_str}"))
        })?;

        Ok(InventoryTransaction {
            id: row.try_get("id")?,
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            kind,
            quantity: row.try_get::<i32, _>("quantity")? as u32,
            order_id: row
                .try_get::<Option<Uuid>, _>("order_id")?
                .map(OrderId::from_uuid),
            previous_stock: row.try_get::<i32, _>("previous_stock")? as u32,
            new_stock: row.try_get::<i32, _>("new_stock")? as u32,
            created_at: row.try_get("created_at")?,
        })
    }

    /// Locks a product row for the duration of the transaction.
    async fn lock_row(
        tx: &mut Transaction<'_, Postgres>,
        product_id: &ProductId,
    ) -> Result<InventoryItem> {
        let row = sqlx::query(
            r#"
            SELECT product_id, product_name, stock_level, reserved_stock, version, last_updated
            FROM inventory
            WHERE product_id = $1
            FOR UPDATE
            "#,
        )
        .bind(product_id.as_str())
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| InventoryError::ProductNotFound(product_id.clone()))?;

        Self::row_to_item(row)
    }

    async fn append_audit(
        tx: &mut Transaction<'_, Postgres>,
        record: &InventoryTransaction,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory_transactions
                (id, product_id, transaction_type, quantity, order_id, previous_stock, new_stock, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.id)
        .bind(record.product_id.as_str())
        .bind(record.kind.as_str())
        .bind(record.quantity as i32)
        .bind(record.order_id.map(|id| id.as_uuid()))
        .bind(record.previous_stock as i32)
        .bind(record.new_stock as i32)
        .bind(record.created_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl InventoryLedger for PostgresLedger {
    async fn create_product(
        &self,
        product_id: &ProductId,
        product_name: &str,
        initial_stock: u32,
    ) -> Result<InventoryItem> {
        sqlx::query(
            r#"
            INSERT INTO inventory (product_id, product_name, stock_level, reserved_stock, version, last_updated)
            VALUES ($1, $2, $3, 0, 1, now())
            ON CONFLICT (product_id) DO NOTHING
            "#,
        )
        .bind(product_id.as_str())
        .bind(product_name)
        .bind(initial_stock as i32)
        .execute(&self.pool)
        .await?;

        self.get(product_id)
            .await?
            .ok_or_else(|| InventoryError::ProductNotFound(product_id.clone()))
    }

    #[tracing::instrument(skip(self))]
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

        let mut tx = self.pool.begin().await?;
        let item = Self::lock_row(&mut tx, product_id).await?;

        let available = item.available();
        if available < quantity {
            return Err(InventoryError::InsufficientStock {
                product_id: product_id.clone(),
                available,
                requested: quantity,
            });
        }

        sqlx::query(
            r#"
            UPDATE inventory
            SET reserved_stock = reserved_stock + $1, version = version + 1, last_updated = now()
            WHERE product_id = $2
            "#,
        )
        .bind(quantity as i32)
        .bind(product_id.as_str())
        .execute(&mut *tx)
        .await?;

        Self::append_audit(
            &mut tx,
            &InventoryTransaction::record(
                product_id.clone(),
                TransactionKind::Reserve,
                quantity,
                Some(order_id),
                item.stock_level,
                item.stock_level,
            ),
        )
        .await?;

        tx.commit().await?;

        metrics::counter!("inventory_reservations_total").increment(1);
        tracing::info!(%product_id, quantity, %order_id, "stock reserved");

        self.get(product_id)
            .await?
            .ok_or_else(|| InventoryError::ProductNotFound(product_id.clone()))
    }

    #[tracing::instrument(skip(self, items), fields(item_count = items.len()))]
    async fn deduct(&self, order_id: OrderId, items: &[StockDeduction]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for deduction in items {
            let item = Self::lock_row(&mut tx, &deduction.product_id).await?;

            if item.stock_level < deduction.quantity {
                return Err(InventoryError::InsufficientStock {
                    product_id: deduction.product_id.clone(),
                    available: item.stock_level,
                    requested: deduction.quantity,
                });
            }
            let new_stock = item.stock_level - deduction.quantity;

            let expected_version = deduction.expected_version.unwrap_or(item.version);
            let updated = sqlx::query(
                r#"
                UPDATE inventory
                SET stock_level = $1,
                    reserved_stock = LEAST(reserved_stock, $1),
                    version = version + 1,
                    last_updated = now()
                WHERE product_id = $2 AND version = $3
                "#,
            )
            .bind(new_stock as i32)
            .bind(deduction.product_id.as_str())
            .bind(expected_version)
            .execute(&mut *tx)
            .await?;

            // Zero rows after the guard means a concurrent writer won.
            if updated.rows_affected() == 0 {
                return Err(InventoryError::VersionConflict {
                    product_id: deduction.product_id.clone(),
                });
            }

            Self::append_audit(
                &mut tx,
                &InventoryTransaction::record(
                    deduction.product_id.clone(),
                    TransactionKind::Deduct,
                    deduction.quantity,
                    Some(order_id),
                    item.stock_level,
                    new_stock,
                ),
            )
            .await?;

            tracing::info!(
                product_id = %deduction.product_id,
                %order_id,
                previous_stock = item.stock_level,
                new_stock,
                "inventory deducted"
            );
        }

        tx.commit().await?;
        metrics::counter!("inventory_deductions_total").increment(1);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn restock(&self, product_id: &ProductId, quantity: u32) -> Result<InventoryItem> {
        let mut tx = self.pool.begin().await?;
        let item = Self::lock_row(&mut tx, product_id).await?;
        // Stock is stored as a signed 32-bit column.
        let new_stock = item
            .stock_level
            .checked_add(quantity)
            .filter(|&n| n <= i32::MAX as u32)
            .ok_or_else(|| {
                InventoryError::InvalidQuantity("restock overflows stock level".to_string())
            })?;

        sqlx::query(
            r#"
            UPDATE inventory
            SET stock_level = $1, version = version + 1, last_updated = now()
            WHERE product_id = $2
            "#,
        )
        .bind(new_stock as i32)
        .bind(product_id.as_str())
        .execute(&mut *tx)
        .await?;

        Self::append_audit(
            &mut tx,
            &InventoryTransaction::record(
                product_id.clone(),
                TransactionKind::Restock,
                quantity,
                None,
                item.stock_level,
                new_stock,
            ),
        )
        .await?;

        tx.commit().await?;
        tracing::info!(%product_id, quantity, new_stock, "inventory restocked");

        self.get(product_id)
            .await?
            .ok_or_else(|| InventoryError::ProductNotFound(product_id.clone()))
    }

    async fn get(&self, product_id: &ProductId) -> Result<Option<InventoryItem>> {
        let row = sqlx::query(
            r#"
            SELECT product_id, product_name, stock_level, reserved_stock, version, last_updated
            FROM inventory
            WHERE product_id = $1
            "#,
        )
        .bind(product_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_item).transpose()
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<InventoryItem>> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, product_name, stock_level, reserved_stock, version, last_updated
            FROM inventory
            ORDER BY product_name
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_item).collect()
    }

    async fn transactions_for(
        &self,
        product_id: &ProductId,
    ) -> Result<Vec<InventoryTransaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, product_id, transaction_type, quantity, order_id,
                   previous_stock, new_stock, created_at
            FROM inventory_transactions
            WHERE product_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(product_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_transaction).collect()
    }
}
