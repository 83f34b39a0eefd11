//! Inventory ledger.
//!
//! Owns per-product stock counters and exposes reserve / deduct / restock /
//! read operations under row-level mutual exclusion, with an append-only
//! audit trail written in the same transaction as every mutation.
//!
//! Two implementations of [`InventoryLedger`] are provided:
//! [`PostgresLedger`] (row locks via `SELECT ... FOR UPDATE`, optimistic
//! version guard on updates) and [`InMemoryLedger`] for tests and
//! single-process deployments.

mod error;
mod item;
mod ledger;
mod memory;
mod postgres;

pub use error::{InventoryError, Result};
pub use item::{InventoryItem, InventoryTransaction, StockDeduction, TransactionKind};
pub use ledger::InventoryLedger;
pub use memory::InMemoryLedger;
pub use postgres::PostgresLedger;
