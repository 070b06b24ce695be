//! Server-push event payloads
//!
//! Shared between the server's broadcaster and SSE consumers.

use serde::{Deserialize, Serialize};

use crate::util::id_string;

/// Event name emitted whenever an order's lifecycle changes or an order
/// is deleted. Subscribers re-fetch the affected order on receipt.
pub const ORDERS_UPDATED: &str = "orders-updated";

/// Payload of an [`ORDERS_UPDATED`] event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEventPayload {
    #[serde(with = "id_string")]
    pub id: i64,
}
