use chrono::{DateTime, Utc};
use common::EventId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event type emitted when an order commits.
pub const ORDER_CREATED: &str = "ORDER_CREATED";

/// A to-be-published event, created in the same transaction as the state
/// change it describes.
///
/// `published` transitions false to true exactly once per successful
/// publish attempt and never reverses. Records are retained after
/// publishing for audit and replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub event_id: EventId,
    pub event_type: String,
    pub aggregate_id: Uuid,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub published: bool,
    pub published_at: Option<DateTime<Utc>>,
}

impl OutboxRecord {
    /// Creates an unpublished record for a fresh domain event.
    pub fn new(
        event_type: impl Into<String>,
        aggregate_id: Uuid,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            event_type: event_type.into(),
            aggregate_id,
            payload,
            created_at: Utc::now(),
            published: false,
            published_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_starts_unpublished() {
        let record = OutboxRecord::new(
            ORDER_CREATED,
            Uuid::new_v4(),
            serde_json::json!({"orderId": "abc"}),
        );
        assert!(!record.published);
        assert!(record.published_at.is_none());
        assert_eq!(record.event_type, "ORDER_CREATED");
    }

    #[test]
    fn records_get_unique_event_ids() {
        let a = OutboxRecord::new(ORDER_CREATED, Uuid::new_v4(), serde_json::json!({}));
        let b = OutboxRecord::new(ORDER_CREATED, Uuid::new_v4(), serde_json::json!({}));
        assert_ne!(a.event_id, b.event_id);
    }
}
