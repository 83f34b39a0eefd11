//! AMQP (RabbitMQ) event bus implementation.
//!
//! Publishes to a durable topic exchange with persistent delivery, routing
//! by the key derived from the event type.

use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, ExchangeDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};

use crate::bus::{EventBus, EventMessage};
use crate::error::BusError;

/// Configuration for the AMQP connection.
#[derive(Debug, Clone)]
pub struct AmqpConfig {
    /// AMQP connection URL (e.g., `amqp://localhost:5672`).
    pub url: String,
    /// Topic exchange name for publishing events.
    pub exchange: String,
}

/// AMQP event bus backed by RabbitMQ.
pub struct AmqpEventBus {
    channel: Channel,
    exchange: String,
}

impl AmqpEventBus {
    /// Connects to the broker and declares the durable topic exchange.
    pub async fn connect(config: AmqpConfig) -> Result<Self, BusError> {
        let connection = Connection::connect(&config.url, ConnectionProperties::default())
            .await
            .map_err(|e| BusError::Connection(format!("failed to connect: {e}")))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| BusError::Connection(format!("failed to create channel: {e}")))?;

        channel
            .exchange_declare(
                &config.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Connection(format!("failed to declare exchange: {e}")))?;

        tracing::info!(exchange = %config.exchange, url = %config.url, "connected to AMQP");

        Ok(Self {
            channel,
            exchange: config.exchange,
        })
    }
}

#[async_trait]
impl EventBus for AmqpEventBus {
    async fn publish(&self, message: &EventMessage) -> Result<(), BusError> {
        let routing_key = message.routing_key();
        let body = serde_json::to_vec(message)
            .map_err(|e| BusError::Publish(format!("failed to encode message: {e}")))?;

        let confirm = self
            .channel
            .basic_publish(
                &self.exchange,
                &routing_key,
                BasicPublishOptions::default(),
                &body,
                // delivery_mode 2 marks the message persistent
                BasicProperties::default().with_delivery_mode(2),
            )
            .await
            .map_err(|e| BusError::Publish(format!("publish failed: {e}")))?;

        confirm
            .await
            .map_err(|e| BusError::Publish(format!("publish confirmation failed: {e}")))?;

        tracing::info!(
            event_id = %message.event_id,
            event_type = %message.event_type,
            %routing_key,
            "event published"
        );
        Ok(())
    }
}
