//! Shared types for the bakery backend
//!
//! Data models and wire payloads shared between the server and API
//! consumers. DB row types derive `sqlx::FromRow` behind the `db` feature
//! so frontend builds don't pull in the database stack.

pub mod events;
pub mod models;
pub mod util;

pub use events::{ORDERS_UPDATED, OrderEventPayload};
