//! Order Lifecycle
//!
//! Every status change goes through the single transition table on
//! [`OrderStatus`]. Side effects (broadcast, email) fire only after the
//! transition has been persisted.

use shared::models::{
    InvalidStatus, ModifyOrderRequest, OrderStatus, OrderWithItems, UpdateStatusRequest,
};

use crate::auth::CurrentUser;
use crate::core::ServerState;
use crate::db::repository::{order as order_repo, user as user_repo};
use crate::orders::money;
use crate::utils::validation::{MAX_ADDRESS_LEN, MAX_NOTE_LEN, validate_required_text};
use crate::utils::{AppError, AppResult};

/// Transition an order's status (admin only).
///
/// A transition to `rejected` stores the supplied reason; every other
/// transition clears a previously stored one. `received` and `ready`
/// additionally email the order owner.
pub async fn update_status(
    state: &ServerState,
    user: &CurrentUser,
    order_id: i64,
    req: &UpdateStatusRequest,
) -> AppResult<OrderWithItems> {
    if !user.is_admin() {
        return Err(AppError::forbidden("Admin role required"));
    }

    let status: OrderStatus = req
        .status
        .parse()
        .map_err(|e: InvalidStatus| AppError::validation(e.to_string()))?;

    let order = order_repo::find_by_id(&state.db, order_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Order {order_id} not found")))?;

    if !order.status.can_transition(status) {
        return Err(AppError::not_modifiable(format!(
            "cannot transition from {} to {}",
            order.status, status
        )));
    }

    let reason = if status == OrderStatus::Rejected {
        let reason = req
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| AppError::validation("A reason is required to reject an order"))?;
        validate_required_text(reason, "reason", MAX_NOTE_LEN)?;
        Some(reason)
    } else {
        None
    };

    order_repo::update_status(&state.db, order_id, status, reason, req.estimated_time).await?;

    let hydrated = hydrate(state, order_id).await?;
    tracing::info!(
        order_id = %order_id,
        from = %order.status,
        to = %status,
        "Order status updated"
    );

    // Post-commit side effects
    state.events.emit_order_updated(order_id);
    notify_owner(state, &hydrated, status).await;

    Ok(hydrated)
}

/// Modify a pending order (owner only): cancel, change the delivery
/// address, or adjust line quantities.
pub async fn modify_order(
    state: &ServerState,
    user: &CurrentUser,
    order_id: i64,
    req: &ModifyOrderRequest,
) -> AppResult<OrderWithItems> {
    let order = order_repo::find_by_id(&state.db, order_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Order {order_id} not found")))?;

    if order.user_id != user.id {
        return Err(AppError::forbidden("You do not own this order"));
    }

    if req.cancel {
        if !order.status.can_transition(OrderStatus::Cancelled) {
            return Err(AppError::not_modifiable(format!(
                "cannot cancel an order that is {}",
                order.status
            )));
        }
        order_repo::update_status(&state.db, order_id, OrderStatus::Cancelled, None, None).await?;
        tracing::info!(order_id = %order_id, "Order cancelled by owner");
        state.events.emit_order_updated(order_id);
        return hydrate(state, order_id).await;
    }

    if order.status != OrderStatus::Pending {
        return Err(AppError::not_modifiable(format!(
            "order is {}, only pending orders can be modified",
            order.status
        )));
    }

    if let Some(address) = &req.delivery_address {
        validate_required_text(address, "deliveryAddress", MAX_ADDRESS_LEN)?;
        order_repo::set_delivery_address(&state.db, order_id, address).await?;
    }

    if let Some(items) = &req.items {
        for upd in items {
            if upd.quantity < 0 {
                return Err(AppError::validation(format!(
                    "quantity for item {} must not be negative",
                    upd.id
                )));
            }
            if upd.quantity > money::MAX_QUANTITY {
                return Err(AppError::validation(format!(
                    "quantity for item {} exceeds the maximum of {}",
                    upd.id,
                    money::MAX_QUANTITY
                )));
            }
        }
        if !items.is_empty() {
            order_repo::update_item_quantities(&state.db, order_id, items).await?;
        }
    }

    hydrate(state, order_id).await
}

/// Delete an order: admins unconditionally, owners only while pending.
pub async fn delete_order(state: &ServerState, user: &CurrentUser, order_id: i64) -> AppResult<()> {
    let order = order_repo::find_by_id(&state.db, order_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Order {order_id} not found")))?;

    let allowed =
        user.is_admin() || (order.user_id == user.id && order.status == OrderStatus::Pending);
    if !allowed {
        return Err(AppError::forbidden("You cannot delete this order"));
    }

    order_repo::delete(&state.db, order_id).await?;
    tracing::info!(order_id = %order_id, user_id = %user.id, "Order deleted");
    state.events.emit_order_updated(order_id);
    Ok(())
}

/// Fetch one hydrated order, enforcing owner-or-admin visibility.
pub async fn get_order(
    state: &ServerState,
    user: &CurrentUser,
    order_id: i64,
) -> AppResult<OrderWithItems> {
    let hydrated = order_repo::find_with_items(&state.db, order_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Order {order_id} not found")))?;

    if !user.is_admin() && hydrated.order.user_id != user.id {
        return Err(AppError::forbidden("You do not own this order"));
    }
    Ok(hydrated)
}

async fn hydrate(state: &ServerState, order_id: i64) -> AppResult<OrderWithItems> {
    order_repo::find_with_items(&state.db, order_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Order {order_id} not found")))
}

/// Email the owner on the transitions customers care about. Best effort:
/// a missing owner row or a gateway failure is logged and dropped.
async fn notify_owner(state: &ServerState, order: &OrderWithItems, status: OrderStatus) {
    let message = match status {
        OrderStatus::Received => Some((
            "Your order has been received",
            format!(
                "Your order #{} has been received and is being processed. Total: {:.2}",
                order.order.id, order.order.total
            ),
        )),
        OrderStatus::Ready => {
            let how = if order.order.is_delivery {
                "is on its way"
            } else {
                "is ready for pickup"
            };
            Some((
                "Your order is ready",
                format!("Your order #{} {}.", order.order.id, how),
            ))
        }
        _ => None,
    };
    let Some((subject, body)) = message else {
        return;
    };

    let owner = match user_repo::find_by_id(&state.db, order.order.user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            tracing::warn!(order_id = %order.order.id, "Order owner no longer exists, skipping email");
            return;
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to look up order owner, skipping email");
            return;
        }
    };

    state.notifier.send(&owner.email, subject, &body).await;
}
