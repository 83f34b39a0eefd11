//! The order aggregate and its lifecycle.

use chrono::{DateTime, Utc};
use common::{CustomerId, IdempotencyKey, Money, OrderId, ProductId};
use serde::{Deserialize, Serialize};

/// Lifecycle state of an order.
///
/// Transitions move strictly forward; no path leads back to `Pending`
/// and no transition leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Accepted, inventory settlement not yet attempted.
    Pending,
    /// Inventory deducted, fulfillment can proceed.
    Confirmed,
    /// Settlement did not complete; awaiting operator attention.
    PendingInventory,
    /// Terminal failure.
    Failed,
    /// Cancelled before confirmation.
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::PendingInventory => "PENDING_INVENTORY",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "CONFIRMED" => Some(Self::Confirmed),
            "PENDING_INVENTORY" => Some(Self::PendingInventory),
            "FAILED" => Some(Self::Failed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether a transition from `self` to `target` is allowed.
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, target),
            (Pending, Confirmed)
                | (Pending, PendingInventory)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (PendingInventory, Confirmed)
                | (PendingInventory, Failed)
                | (PendingInventory, Cancelled)
        )
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A line item on an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
    /// Unit price at the time the order was placed.
    pub price: Money,
}

impl OrderItem {
    /// Line total, quantity times unit price.
    pub fn line_total(&self) -> Money {
        self.price.multiply(self.quantity)
    }
}

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub items: Vec<OrderItem>,
    /// Computed once at creation from the item line totals.
    pub total_amount: Money,
    pub status: OrderStatus,
    pub idempotency_key: IdempotencyKey,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An order intake request, before validation and pricing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub customer_id: CustomerId,
    pub items: Vec<NewOrderItem>,
    pub idempotency_key: Option<IdempotencyKey>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Money,
}

impl NewOrder {
    /// Validates the request shape. No state is touched.
    pub fn validate(&self) -> Result<(), String> {
        if self.items.is_empty() {
            return Err("order must contain at least one item".to_string());
        }
        for item in &self.items {
            if item.quantity == 0 {
                return Err(format!(
                    "quantity for product {} must be positive",
                    item.product_id
                ));
            }
            if item.price.is_negative() {
                return Err(format!(
                    "price for product {} must not be negative",
                    item.product_id
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_move_forward_only() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(PendingInventory));
        assert!(PendingInventory.can_transition_to(Confirmed));

        assert!(!Confirmed.can_transition_to(Pending));
        assert!(!Confirmed.can_transition_to(Cancelled));
        assert!(!Failed.can_transition_to(Pending));
        assert!(!Cancelled.can_transition_to(Confirmed));
        assert!(!PendingInventory.can_transition_to(Pending));
    }

    #[test]
    fn terminal_states_accept_nothing() {
        use OrderStatus::*;
        for terminal in [Confirmed, Failed, Cancelled] {
            for target in [Pending, Confirmed, PendingInventory, Failed, Cancelled] {
                assert!(!terminal.can_transition_to(target));
            }
        }
    }

    #[test]
    fn status_wire_format_roundtrip() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::PendingInventory,
            OrderStatus::Failed,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(
            serde_json::to_string(&OrderStatus::PendingInventory).unwrap(),
            "\"PENDING_INVENTORY\""
        );
    }

    #[test]
    fn line_total_multiplies_unit_price() {
        let item = OrderItem {
            product_id: ProductId::new("SKU-1"),
            quantity: 3,
            price: Money::from_cents(250),
        };
        assert_eq!(item.line_total(), Money::from_cents(750));
    }

    #[test]
    fn validation_rejects_empty_and_zero_quantity() {
        let empty = NewOrder {
            customer_id: CustomerId::new(),
            items: vec![],
            idempotency_key: None,
        };
        assert!(empty.validate().is_err());

        let zero_qty = NewOrder {
            customer_id: CustomerId::new(),
            items: vec![NewOrderItem {
                product_id: ProductId::new("SKU-1"),
                quantity: 0,
                price: Money::from_cents(100),
            }],
            idempotency_key: None,
        };
        assert!(zero_qty.validate().is_err());

        let negative = NewOrder {
            customer_id: CustomerId::new(),
            items: vec![NewOrderItem {
                product_id: ProductId::new("SKU-1"),
                quantity: 1,
                price: Money::from_cents(-5),
            }],
            idempotency_key: None,
        };
        assert!(negative.validate().is_err());
    }
}
