//! Transactional outbox.
//!
//! Order creation writes an [`OutboxRecord`] in the same local transaction
//! as the order itself; the [`OutboxRelay`] drains unpublished records to
//! an [`EventBus`] on a fixed period. Delivery is at-least-once: a crash
//! between publish and mark-published republishes on restart, and
//! consumers deduplicate by event ID.

mod amqp;
mod bus;
mod error;
mod record;
mod relay;
mod store;

pub use amqp::{AmqpConfig, AmqpEventBus};
pub use bus::{DisabledEventBus, EventBus, EventMessage, InMemoryEventBus};
pub use error::{BusError, OutboxError, Result};
pub use record::{ORDER_CREATED, OutboxRecord};
pub use relay::{OutboxRelay, RelayStats};
pub use store::{InMemoryOutbox, OutboxClaim, OutboxStore, PostgresOutbox};
