//! The outbox relay: a recurring task draining unpublished records.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::bus::{EventBus, EventMessage};
use crate::store::OutboxStore;

/// Outcome of one relay cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub published: usize,
    pub failed: usize,
}

/// Publishes unpublished outbox records to the event bus, oldest first,
/// at a fixed period.
///
/// Delivery is at-least-once: rows are marked published only after a
/// successful publish, so a crash in between republishes on restart.
/// Rows are never deleted and never reordered within a batch.
pub struct OutboxRelay<S> {
    store: Arc<S>,
    bus: Arc<dyn EventBus>,
    period: Duration,
    batch_size: i64,
}

impl<S: OutboxStore> OutboxRelay<S> {
    /// Creates a relay over the given store and bus.
    pub fn new(store: Arc<S>, bus: Arc<dyn EventBus>, period: Duration, batch_size: i64) -> Self {
        Self {
            store,
            bus,
            period,
            batch_size,
        }
    }

    /// Runs the relay until the shutdown signal flips.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(period_ms = self.period.as_millis() as u64, "outbox relay started");
        let mut ticker = tokio::time::interval(self.period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        tracing::error!(error = %e, "outbox cycle failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("outbox relay stopped");
    }

    /// Drains one batch. Publish failures leave the row untouched for the
    /// next cycle.
    pub async fn run_once(&self) -> crate::Result<RelayStats> {
        let mut claim = self.store.claim_batch(self.batch_size).await?;
        let records = claim.records().to_vec();

        if records.is_empty() {
            claim.release().await?;
            return Ok(RelayStats::default());
        }

        tracing::info!(count = records.len(), "processing outbox batch");
        let mut stats = RelayStats::default();

        for record in records {
            let message = EventMessage {
                event_id: record.event_id,
                event_type: record.event_type.clone(),
                data: record.payload.clone(),
                timestamp: record.created_at,
            };

            match self.bus.publish(&message).await {
                Ok(()) => {
                    claim.mark_published(record.event_id).await?;
                    stats.published += 1;
                    metrics::counter!("outbox_published_total").increment(1);
                    tracing::info!(
                        event_id = %record.event_id,
                        event_type = %record.event_type,
                        aggregate_id = %record.aggregate_id,
                        "outbox event published"
                    );
                }
                Err(e) => {
                    stats.failed += 1;
                    metrics::counter!("outbox_publish_failures_total").increment(1);
                    tracing::warn!(
                        event_id = %record.event_id,
                        error = %e,
                        "failed to publish outbox event, will retry"
                    );
                }
            }
        }

        claim.release().await?;
        tracing::info!(published = stats.published, failed = stats.failed, "outbox cycle complete");
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryEventBus;
    use crate::record::{ORDER_CREATED, OutboxRecord};
    use crate::store::InMemoryOutbox;
    use uuid::Uuid;

    fn relay(store: &InMemoryOutbox, bus: &InMemoryEventBus) -> OutboxRelay<InMemoryOutbox> {
        OutboxRelay::new(
            Arc::new(store.clone()),
            Arc::new(bus.clone()),
            Duration::from_millis(10),
            10,
        )
    }

    fn record() -> OutboxRecord {
        OutboxRecord::new(ORDER_CREATED, Uuid::new_v4(), serde_json::json!({"total": 100}))
    }

    #[tokio::test]
    async fn publishes_and_marks_records() {
        let store = InMemoryOutbox::new();
        let bus = InMemoryEventBus::new();
        store.insert(record()).unwrap();
        store.insert(record()).unwrap();

        let stats = relay(&store, &bus).run_once().await.unwrap();

        assert_eq!(stats, RelayStats { published: 2, failed: 0 });
        assert_eq!(bus.published_count().await, 2);
        assert_eq!(store.unpublished_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_publish_leaves_record_for_next_cycle() {
        let store = InMemoryOutbox::new();
        let bus = InMemoryEventBus::new();
        store.insert(record()).unwrap();

        bus.set_fail_on_publish(true).await;
        let stats = relay(&store, &bus).run_once().await.unwrap();
        assert_eq!(stats, RelayStats { published: 0, failed: 1 });
        assert_eq!(store.unpublished_count().await.unwrap(), 1);

        bus.set_fail_on_publish(false).await;
        let stats = relay(&store, &bus).run_once().await.unwrap();
        assert_eq!(stats.published, 1);
        assert_eq!(store.unpublished_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn batch_is_published_oldest_first() {
        let store = InMemoryOutbox::new();
        let bus = InMemoryEventBus::new();

        let mut old = record();
        old.created_at = chrono::Utc::now() - chrono::Duration::seconds(30);
        let old_id = old.event_id;
        store.insert(record()).unwrap();
        store.insert(old).unwrap();

        relay(&store, &bus).run_once().await.unwrap();

        let published = bus.published().await;
        assert_eq!(published[0].event_id, old_id);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown_signal() {
        let store = InMemoryOutbox::new();
        let bus = InMemoryEventBus::new();
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(relay(&store, &bus).run(rx));
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("relay did not stop")
            .unwrap();
    }
}
