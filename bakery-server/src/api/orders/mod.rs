//! Order API 模块
//!
//! 下单、查询、状态流转、修改/删除，以及 SSE 事件流。

mod handler;

use axum::{
    Router, middleware,
    routing::{get, post, put},
};

use crate::auth::require_admin;
use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/orders", order_routes())
}

fn order_routes() -> Router<ServerState> {
    Router::new()
        .route("/", post(handler::create).get(handler::list_mine))
        // Admin view of every order
        .route(
            "/all",
            get(handler::list_all).route_layer(middleware::from_fn(require_admin)),
        )
        // Server-push stream (public; EventSource can't set headers)
        .route("/events", get(handler::events))
        .route(
            "/{id}",
            get(handler::get_by_id)
                .put(handler::modify)
                .delete(handler::delete),
        )
        .route(
            "/{id}/status",
            put(handler::update_status).route_layer(middleware::from_fn(require_admin)),
        )
}
