//! Order Model
//!
//! The order status lifecycle lives here as a closed enum with a single
//! transition table; every caller (API handlers, lifecycle service, tests)
//! goes through [`OrderStatus::can_transition`] instead of keeping its own
//! copy of the allowed-status list.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::util::id_string;

/// Order fulfillment status
///
/// `pending → received → preparing → ready → delivered`, with two
/// alternate exits: `cancelled` (owner, while still pending) and
/// `rejected` (admin, from any non-terminal state; may be re-opened
/// back into `received`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Received,
    Preparing,
    Ready,
    Delivered,
    Cancelled,
    Rejected,
}

/// Unknown status string in a request
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid order status: {0}")]
pub struct InvalidStatus(pub String);

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Received => "received",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Rejected => "rejected",
        }
    }

    /// Fulfillment has ended. Terminal orders can no longer advance or be
    /// rejected; of the three, only `rejected` has a way back (re-open).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }

    /// The transition table.
    ///
    /// Fulfillment advances one step at a time; `rejected` is reachable
    /// from every non-terminal state, `cancelled` only from `pending`.
    /// A rejected order can be re-opened into `received` (which clears
    /// the stored reason); `delivered` and `cancelled` are final.
    pub fn can_transition(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Pending, Received) | (Pending, Cancelled) => true,
            (Received, Preparing) => true,
            (Preparing, Ready) => true,
            (Ready, Delivered) => true,
            (Rejected, Received) => true,
            (from, Rejected) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "received" => Ok(OrderStatus::Received),
            "preparing" => Ok(OrderStatus::Preparing),
            "ready" => Ok(OrderStatus::Ready),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "rejected" => Ok(OrderStatus::Rejected),
            other => Err(InvalidStatus(other.to_string())),
        }
    }
}

/// Order entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(with = "id_string")]
    pub id: i64,
    #[serde(with = "id_string")]
    pub user_id: i64,
    pub status: OrderStatus,
    /// Sum of item subtotals in currency unit (derived, never client-set)
    pub total: f64,
    pub payment_method: String,
    pub is_delivery: bool,
    pub delivery_address: Option<String>,
    /// Set on transition to `rejected`, cleared by any other transition
    pub rejection_reason: Option<String>,
    /// Estimated preparation/delivery time in minutes
    pub estimated_time: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Order line with the referenced product's public fields joined in
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct OrderItemWithProduct {
    #[serde(with = "id_string")]
    pub id: i64,
    #[serde(with = "id_string")]
    pub order_id: i64,
    #[serde(with = "id_string")]
    pub product_id: i64,
    pub quantity: i64,
    /// Unit price frozen at order creation, not the live catalog price
    pub price_unit: f64,
    pub subtotal: f64,
    pub product_name: String,
    /// Current catalog price, for display only
    pub product_price: f64,
}

/// Fully hydrated order: the order row plus its lines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItemWithProduct>,
}

/// One requested line in a create-order call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemInput {
    #[serde(with = "id_string")]
    pub product_id: i64,
    pub quantity: i64,
}

/// Create order payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub items: Vec<OrderItemInput>,
    pub payment_method: String,
    #[serde(default)]
    pub is_delivery: bool,
    pub delivery_address: Option<String>,
}

/// Create order response: hydrated order plus a human-readable summary
/// ("2x Croissant, 1x Baguette")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderResponse {
    pub order: OrderWithItems,
    pub summary: String,
}

/// Status transition payload (admin)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub status: String,
    /// Required when transitioning to `rejected`
    pub reason: Option<String>,
    pub estimated_time: Option<i64>,
}

/// Quantity adjustment for one existing order line; zero deletes the line
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemQuantityUpdate {
    #[serde(with = "id_string")]
    pub id: i64,
    pub quantity: i64,
}

/// Modify-order payload (owner, while the order is still pending)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyOrderRequest {
    /// Cancel the order (terminal)
    #[serde(default)]
    pub cancel: bool,
    pub delivery_address: Option<String>,
    pub items: Option<Vec<ItemQuantityUpdate>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_chain_advances_one_step() {
        use OrderStatus::*;
        assert!(Pending.can_transition(Received));
        assert!(Received.can_transition(Preparing));
        assert!(Preparing.can_transition(Ready));
        assert!(Ready.can_transition(Delivered));

        // No skipping ahead
        assert!(!Pending.can_transition(Preparing));
        assert!(!Pending.can_transition(Delivered));
        assert!(!Received.can_transition(Delivered));
    }

    #[test]
    fn cancel_only_from_pending() {
        use OrderStatus::*;
        assert!(Pending.can_transition(Cancelled));
        assert!(!Received.can_transition(Cancelled));
        assert!(!Ready.can_transition(Cancelled));
        assert!(!Delivered.can_transition(Cancelled));
    }

    #[test]
    fn reject_from_any_non_terminal() {
        use OrderStatus::*;
        assert!(Pending.can_transition(Rejected));
        assert!(Received.can_transition(Rejected));
        assert!(Preparing.can_transition(Rejected));
        assert!(Ready.can_transition(Rejected));

        assert!(!Delivered.can_transition(Rejected));
        assert!(!Cancelled.can_transition(Rejected));
        assert!(!Rejected.can_transition(Rejected));
    }

    #[test]
    fn final_states_admit_nothing() {
        use OrderStatus::*;
        for terminal in [Delivered, Cancelled] {
            for next in [
                Pending, Received, Preparing, Ready, Delivered, Cancelled, Rejected,
            ] {
                assert!(!terminal.can_transition(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn rejected_can_only_be_reopened() {
        use OrderStatus::*;
        assert!(Rejected.can_transition(Received));
        for next in [Pending, Preparing, Ready, Delivered, Cancelled, Rejected] {
            assert!(!Rejected.can_transition(next), "rejected -> {next}");
        }
    }

    #[test]
    fn status_parses_from_wire_form() {
        assert_eq!("pending".parse::<OrderStatus>(), Ok(OrderStatus::Pending));
        assert_eq!("rejected".parse::<OrderStatus>(), Ok(OrderStatus::Rejected));
        assert!("sent".parse::<OrderStatus>().is_err());
        assert!("PENDING".parse::<OrderStatus>().is_err());
    }
}
