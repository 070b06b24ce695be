//! Order API Handlers
//!
//! Thin HTTP layer over [`crate::orders::assembly`] and
//! [`crate::orders::lifecycle`]; ownership and role checks live there.

use std::convert::Infallible;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use tokio::sync::broadcast::error::RecvError;

use shared::models::{
    CreateOrderRequest, CreateOrderResponse, ModifyOrderRequest, OrderWithItems,
    UpdateStatusRequest,
};

use crate::auth::CurrentUser;
use crate::core::ServerState;
use crate::db::repository::order as order_repo;
use crate::orders::{assembly, lifecycle};
use crate::utils::AppResult;

/// POST /api/orders - 下单
pub async fn create(
    State(state): State<ServerState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<CreateOrderRequest>,
) -> AppResult<(StatusCode, Json<CreateOrderResponse>)> {
    let response = assembly::create_order(&state, &user, &payload).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /api/orders - 当前用户的订单
pub async fn list_mine(
    State(state): State<ServerState>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Json<Vec<OrderWithItems>>> {
    let orders = order_repo::find_by_user(&state.db, user.id).await?;
    Ok(Json(orders))
}

/// GET /api/orders/all - 所有订单 (路由层已限定管理员)
pub async fn list_all(
    State(state): State<ServerState>,
) -> AppResult<Json<Vec<OrderWithItems>>> {
    let orders = order_repo::find_all(&state.db).await?;
    Ok(Json(orders))
}

/// GET /api/orders/:id - 单个订单 (所有者或管理员)
pub async fn get_by_id(
    State(state): State<ServerState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<OrderWithItems>> {
    let order = lifecycle::get_order(&state, &user, id).await?;
    Ok(Json(order))
}

/// PUT /api/orders/:id/status - 状态流转 (仅管理员)
pub async fn update_status(
    State(state): State<ServerState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateStatusRequest>,
) -> AppResult<Json<OrderWithItems>> {
    let order = lifecycle::update_status(&state, &user, id, &payload).await?;
    Ok(Json(order))
}

/// PUT /api/orders/:id - 修改待处理订单 (仅所有者)
pub async fn modify(
    State(state): State<ServerState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<ModifyOrderRequest>,
) -> AppResult<Json<OrderWithItems>> {
    let order = lifecycle::modify_order(&state, &user, id, &payload).await?;
    Ok(Json(order))
}

/// DELETE /api/orders/:id - 删除订单
pub async fn delete(
    State(state): State<ServerState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    lifecycle::delete_order(&state, &user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/orders/events - SSE 事件流
///
/// Emits `orders-updated` frames with an `{id}` payload whenever a status
/// changes or an order is deleted. No replay: subscribers only see events
/// emitted while connected.
pub async fn events(
    State(state): State<ServerState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.events.subscribe();
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(ev) => {
                    let event = Event::default().event(ev.event).data(ev.data);
                    return Some((Ok(event), rx));
                }
                // Dropped events are fine: consumers re-fetch on receipt
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
