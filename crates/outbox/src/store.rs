//! Outbox storage: claimed batch reads for the relay.
//!
//! A claim holds the selected rows exclusively until it is released, so
//! two relay instances never publish the same record concurrently. In
//! Postgres the claim is a transaction with `FOR UPDATE SKIP LOCKED`;
//! in memory it is a claimed-ID set under one lock.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::EventId;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::error::{OutboxError, Result};
use crate::record::OutboxRecord;

/// Relay-facing view of the outbox table.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Claims up to `limit` of the oldest unpublished records exclusively.
    async fn claim_batch(&self, limit: i64) -> Result<Box<dyn OutboxClaim>>;

    /// Number of records still awaiting publication.
    async fn unpublished_count(&self) -> Result<i64>;
}

/// An exclusive claim over a batch of unpublished records.
///
/// Records not marked published before the claim is released stay
/// unpublished and are picked up again on a later cycle.
#[async_trait]
pub trait OutboxClaim: Send {
    /// The claimed records, oldest first.
    fn records(&self) -> &[OutboxRecord];

    /// Marks one record published. The flag never reverses.
    async fn mark_published(&mut self, event_id: EventId) -> Result<()>;

    /// Releases the claim, persisting the published marks.
    async fn release(self: Box<Self>) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

/// PostgreSQL-backed outbox store.
#[derive(Clone)]
pub struct PostgresOutbox {
    pool: PgPool,
}

impl PostgresOutbox {
    /// Creates a new PostgreSQL outbox store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: PgRow) -> Result<OutboxRecord> {
        Ok(OutboxRecord {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("event_id")?),
            event_type: row.try_get("event_type")?,
            aggregate_id: row.try_get("aggregate_id")?,
            payload: row.try_get("payload")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            published: row.try_get("published")?,
            published_at: row.try_get("published_at")?,
        })
    }
}

struct PostgresClaim {
    tx: Transaction<'static, Postgres>,
    records: Vec<OutboxRecord>,
}

#[async_trait]
impl OutboxStore for PostgresOutbox {
    async fn claim_batch(&self, limit: i64) -> Result<Box<dyn OutboxClaim>> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            r#"
            SELECT event_id, event_type, aggregate_id, payload, created_at, published, published_at
            FROM outbox
            WHERE NOT published
            ORDER BY created_at ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;

        let records = rows
            .into_iter()
            .map(Self::row_to_record)
            .collect::<Result<Vec<_>>>()?;

        Ok(Box::new(PostgresClaim { tx, records }))
    }

    async fn unpublished_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outbox WHERE NOT published")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl OutboxClaim for PostgresClaim {
    fn records(&self) -> &[OutboxRecord] {
        &self.records
    }

    async fn mark_published(&mut self, event_id: EventId) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE outbox
            SET published = TRUE, published_at = now()
            WHERE event_id = $1
            "#,
        )
        .bind(event_id.as_uuid())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn release(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct InMemoryOutboxState {
    records: Vec<OutboxRecord>,
    claimed: HashSet<EventId>,
    fail_on_insert: bool,
}

/// In-memory outbox for tests and single-process deployments.
///
/// Cloning shares the underlying state, so the order store and the relay
/// can hold handles to the same outbox.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOutbox {
    state: Arc<RwLock<InMemoryOutboxState>>,
}

impl InMemoryOutbox {
    /// Creates a new empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record. The order store calls this inside its own
    /// atomic create so that order and event commit together.
    pub fn insert(&self, record: OutboxRecord) -> Result<()> {
        let mut state = self.state.write().expect("outbox lock poisoned");
        if state.fail_on_insert {
            return Err(OutboxError::Unavailable("injected failure".to_string()));
        }
        state.records.push(record);
        Ok(())
    }

    /// Configures the next inserts to fail, for atomicity tests.
    pub fn set_fail_on_insert(&self, fail: bool) {
        self.state.write().expect("outbox lock poisoned").fail_on_insert = fail;
    }

    /// Returns a snapshot of all records, oldest first.
    pub fn all_records(&self) -> Vec<OutboxRecord> {
        self.state.read().expect("outbox lock poisoned").records.clone()
    }

    /// Clears the published flag on a record, simulating a relay crash
    /// between publish and mark-published.
    pub fn reset_published(&self, event_id: EventId) {
        let mut state = self.state.write().expect("outbox lock poisoned");
        if let Some(record) = state.records.iter_mut().find(|r| r.event_id == event_id) {
            record.published = false;
            record.published_at = None;
        }
    }
}

struct InMemoryClaim {
    store: InMemoryOutbox,
    records: Vec<OutboxRecord>,
    claimed: Vec<EventId>,
}

#[async_trait]
impl OutboxStore for InMemoryOutbox {
    async fn claim_batch(&self, limit: i64) -> Result<Box<dyn OutboxClaim>> {
        let mut state = self.state.write().expect("outbox lock poisoned");

        let mut records: Vec<OutboxRecord> = state
            .records
            .iter()
            .filter(|r| !r.published && !state.claimed.contains(&r.event_id))
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at);
        records.truncate(limit.max(0) as usize);

        let claimed: Vec<EventId> = records.iter().map(|r| r.event_id).collect();
        state.claimed.extend(claimed.iter().copied());

        Ok(Box::new(InMemoryClaim {
            store: self.clone(),
            records,
            claimed,
        }))
    }

    async fn unpublished_count(&self) -> Result<i64> {
        let state = self.state.read().expect("outbox lock poisoned");
        Ok(state.records.iter().filter(|r| !r.published).count() as i64)
    }
}

#[async_trait]
impl OutboxClaim for InMemoryClaim {
    fn records(&self) -> &[OutboxRecord] {
        &self.records
    }

    async fn mark_published(&mut self, event_id: EventId) -> Result<()> {
        let mut state = self.store.state.write().expect("outbox lock poisoned");
        let record = state
            .records
            .iter_mut()
            .find(|r| r.event_id == event_id)
            .ok_or(OutboxError::NotClaimed(event_id))?;
        record.published = true;
        record.published_at = Some(Utc::now());
        Ok(())
    }

    async fn release(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

impl Drop for InMemoryClaim {
    fn drop(&mut self) {
        if let Ok(mut state) = self.store.state.write() {
            for id in &self.claimed {
                state.claimed.remove(id);
            }
        }
    }
}
