//! Event bus contract and the non-broker implementations.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::EventId;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::BusError;

/// The wire shape of a published event.
///
/// Consumers must treat `event_id` as the deduplication key: delivery is
/// at-least-once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMessage {
    pub event_id: EventId,
    pub event_type: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl EventMessage {
    /// Routing key derived from the event type:
    /// `ORDER_CREATED` becomes `order.order.created`.
    pub fn routing_key(&self) -> String {
        format!("order.{}", self.event_type.to_lowercase().replace('_', "."))
    }
}

/// Durable topic publish.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes one message. An error leaves the corresponding outbox
    /// row untouched for a later retry.
    async fn publish(&self, message: &EventMessage) -> Result<(), BusError>;
}

#[derive(Debug, Default)]
struct InMemoryBusState {
    published: Vec<EventMessage>,
    fail_on_publish: bool,
}

/// In-memory bus for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventBus {
    state: Arc<RwLock<InMemoryBusState>>,
}

impl InMemoryEventBus {
    /// Creates a new in-memory event bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the bus to fail publish attempts.
    pub async fn set_fail_on_publish(&self, fail: bool) {
        self.state.write().await.fail_on_publish = fail;
    }

    /// Returns all messages published so far, in publish order.
    pub async fn published(&self) -> Vec<EventMessage> {
        self.state.read().await.published.clone()
    }

    /// Returns the number of messages published so far.
    pub async fn published_count(&self) -> usize {
        self.state.read().await.published.len()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, message: &EventMessage) -> Result<(), BusError> {
        let mut state = self.state.write().await;
        if state.fail_on_publish {
            return Err(BusError::Publish("injected failure".to_string()));
        }
        state.published.push(message.clone());
        Ok(())
    }
}

/// Bus implementation for deployments without a broker.
///
/// Selected explicitly at startup instead of probing for the broker at
/// call time. Every publish fails with [`BusError::Disabled`], so outbox
/// rows stay unpublished until a broker-backed deployment drains them.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledEventBus;

impl DisabledEventBus {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventBus for DisabledEventBus {
    async fn publish(&self, message: &EventMessage) -> Result<(), BusError> {
        tracing::debug!(event_type = %message.event_type, "event bus disabled, keeping record unpublished");
        Err(BusError::Disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(event_type: &str) -> EventMessage {
        EventMessage {
            event_id: EventId::new(),
            event_type: event_type.to_string(),
            data: serde_json::json!({}),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn routing_key_is_derived_from_event_type() {
        assert_eq!(message("ORDER_CREATED").routing_key(), "order.order.created");
        assert_eq!(message("ORDER_CANCELLED").routing_key(), "order.order.cancelled");
    }

    #[tokio::test]
    async fn in_memory_bus_records_published_messages() {
        let bus = InMemoryEventBus::new();
        bus.publish(&message("ORDER_CREATED")).await.unwrap();
        assert_eq!(bus.published_count().await, 1);
    }

    #[tokio::test]
    async fn in_memory_bus_fail_toggle() {
        let bus = InMemoryEventBus::new();
        bus.set_fail_on_publish(true).await;
        assert!(bus.publish(&message("ORDER_CREATED")).await.is_err());
        assert_eq!(bus.published_count().await, 0);
    }

    #[tokio::test]
    async fn disabled_bus_rejects_everything() {
        let bus = DisabledEventBus::new();
        let err = bus.publish(&message("ORDER_CREATED")).await.unwrap_err();
        assert!(matches!(err, BusError::Disabled));
    }
}
