//! Order event broadcaster
//!
//! Process-scoped fan-out of lifecycle changes to connected server-push
//! subscribers. Built on a tokio broadcast channel: no persistence and no
//! replay — a subscriber that connects after an event simply misses it,
//! and a subscriber that falls behind has old events overwritten.
//!
//! The registry is constructed at startup and injected through
//! `ServerState`; separate instances (e.g. in tests) never
//! cross-contaminate.

use serde::Serialize;
use tokio::sync::broadcast;

use shared::events::{ORDERS_UPDATED, OrderEventPayload};

/// One server-push frame: event name plus JSON-encoded data
#[derive(Debug, Clone)]
pub struct OrderEvent {
    pub event: &'static str,
    pub data: String,
}

/// Broadcast registry for order lifecycle events
#[derive(Debug, Clone)]
pub struct OrderEvents {
    tx: broadcast::Sender<OrderEvent>,
}

impl OrderEvents {
    /// Channel capacity: events are tiny and consumers re-fetch on
    /// receipt, so a small buffer is plenty.
    const CAPACITY: usize = 64;

    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(Self::CAPACITY);
        Self { tx }
    }

    /// Register a new subscriber. Dropping the receiver unregisters it.
    pub fn subscribe(&self) -> broadcast::Receiver<OrderEvent> {
        self.tx.subscribe()
    }

    /// Best-effort fan-out to every currently connected subscriber.
    /// No subscribers is not an error.
    pub fn emit<T: Serialize>(&self, event: &'static str, payload: &T) {
        let data = match serde_json::to_string(payload) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(event = event, error = %e, "Failed to encode event payload");
                return;
            }
        };
        let _ = self.tx.send(OrderEvent { event, data });
    }

    /// Emit `orders-updated` for one order id.
    pub fn emit_order_updated(&self, id: i64) {
        self.emit(ORDERS_UPDATED, &OrderEventPayload { id });
    }

    /// Number of live subscribers (used by tests and the health route).
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for OrderEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let events = OrderEvents::new();
        let mut rx = events.subscribe();

        events.emit_order_updated(42);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event, ORDERS_UPDATED);
        assert_eq!(event.data, r#"{"id":"42"}"#);
    }

    #[tokio::test]
    async fn late_subscribers_miss_earlier_events() {
        let events = OrderEvents::new();
        events.emit_order_updated(1);

        let mut rx = events.subscribe();
        events.emit_order_updated(2);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.data, r#"{"id":"2"}"#);
    }

    #[tokio::test]
    async fn emit_without_subscribers_is_fine() {
        let events = OrderEvents::new();
        assert_eq!(events.subscriber_count(), 0);
        events.emit_order_updated(7); // must not panic
    }

    #[tokio::test]
    async fn instances_do_not_cross_contaminate() {
        let a = OrderEvents::new();
        let b = OrderEvents::new();
        let mut rx_b = b.subscribe();

        a.emit_order_updated(1);
        assert!(matches!(
            rx_b.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
