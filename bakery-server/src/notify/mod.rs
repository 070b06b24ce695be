//! Notification side channels
//!
//! - [`events`] - in-process broadcast of order lifecycle changes to
//!   connected SSE subscribers
//! - [`email`] - fire-and-forget email through an injected [`Notifier`]

pub mod email;
pub mod events;

pub use email::{EmailNotifier, NoopNotifier, Notifier};
pub use events::{OrderEvent, OrderEvents};
