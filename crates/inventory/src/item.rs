//! Ledger entities: stock rows and the audit trail.

use chrono::{DateTime, Utc};
use common::{OrderId, ProductId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single product's stock counters.
///
/// Invariants held before and after every ledger operation:
/// `stock_level >= 0`, `0 <= reserved_stock <= stock_level`, and
/// `version` increments by exactly 1 on every accepted mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub stock_level: u32,
    pub reserved_stock: u32,
    pub version: i64,
    pub last_updated: DateTime<Utc>,
}

impl InventoryItem {
    /// Stock that can still be reserved or deducted.
    pub fn available(&self) -> u32 {
        self.stock_level - self.reserved_stock
    }
}

/// The kind of mutation an audit row records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Reserve,
    Deduct,
    Restock,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Reserve => "RESERVE",
            TransactionKind::Deduct => "DEDUCT",
            TransactionKind::Restock => "RESTOCK",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RESERVE" => Some(TransactionKind::Reserve),
            "DEDUCT" => Some(TransactionKind::Deduct),
            "RESTOCK" => Some(TransactionKind::Restock),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One append-only audit row, written in the same transaction as the
/// mutation it records.
///
/// A RESERVE row keeps `previous_stock == new_stock`: reservations move
/// `reserved_stock`, not `stock_level`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryTransaction {
    pub id: Uuid,
    pub product_id: ProductId,
    pub kind: TransactionKind,
    pub quantity: u32,
    pub order_id: Option<OrderId>,
    pub previous_stock: u32,
    pub new_stock: u32,
    pub created_at: DateTime<Utc>,
}

impl InventoryTransaction {
    pub(crate) fn record(
        product_id: ProductId,
        kind: TransactionKind,
        quantity: u32,
        order_id: Option<OrderId>,
        previous_stock: u32,
        new_stock: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id,
            kind,
            quantity,
            order_id,
            previous_stock,
            new_stock,
            created_at: Utc::now(),
        }
    }
}

/// One line of a settlement deduction request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockDeduction {
    pub product_id: ProductId,
    pub quantity: u32,
    /// When set, the update is guarded with `WHERE version = expected`;
    /// a zero-row update surfaces as a version conflict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<i64>,
}

impl StockDeduction {
    pub fn new(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            expected_version: None,
        }
    }

    pub fn with_expected_version(mut self, version: i64) -> Self {
        self.expected_version = Some(version);
        self
    }
}
