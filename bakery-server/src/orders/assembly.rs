//! Order Assembly
//!
//! Validates a create-order request before anything is written, then runs
//! the transactional creation in the order repository and builds the
//! response with its human-readable summary line.

use shared::models::{CreateOrderRequest, CreateOrderResponse, OrderWithItems};

use crate::auth::CurrentUser;
use crate::core::ServerState;
use crate::db::repository::order as order_repo;
use crate::orders::money;
use crate::utils::validation::{
    MAX_ADDRESS_LEN, MAX_NAME_LEN, validate_optional_text, validate_required_text,
};
use crate::utils::{AppError, AppResult};

/// Create an order for the authenticated user.
///
/// Either every line is reserved and persisted or none are; the
/// repository rolls the transaction back on the first failing line.
pub async fn create_order(
    state: &ServerState,
    user: &CurrentUser,
    req: &CreateOrderRequest,
) -> AppResult<CreateOrderResponse> {
    validate(req)?;

    let order_id = order_repo::create(&state.db, user.id, req).await?;

    let order = order_repo::find_with_items(&state.db, order_id)
        .await?
        .ok_or_else(|| AppError::internal(format!("Order {order_id} missing after commit")))?;

    let summary = summarize(&order);
    tracing::info!(
        order_id = %order_id,
        user_id = %user.id,
        total = order.order.total,
        "Order created"
    );

    Ok(CreateOrderResponse { order, summary })
}

/// Boundary validation — rejected before any mutation happens.
fn validate(req: &CreateOrderRequest) -> AppResult<()> {
    if req.items.is_empty() {
        return Err(AppError::validation("Order must contain at least one item"));
    }
    validate_required_text(&req.payment_method, "paymentMethod", MAX_NAME_LEN)?;
    validate_optional_text(&req.delivery_address, "deliveryAddress", MAX_ADDRESS_LEN)?;
    for item in &req.items {
        if item.quantity < 1 {
            return Err(AppError::validation(format!(
                "quantity for product {} must be at least 1",
                item.product_id
            )));
        }
        if item.quantity > money::MAX_QUANTITY {
            return Err(AppError::validation(format!(
                "quantity for product {} exceeds the maximum of {}",
                item.product_id,
                money::MAX_QUANTITY
            )));
        }
    }
    Ok(())
}

/// Receipt line: "2x Croissant, 1x Baguette"
pub fn summarize(order: &OrderWithItems) -> String {
    order
        .items
        .iter()
        .map(|item| format!("{}x {}", item.quantity, item.product_name))
        .collect::<Vec<_>>()
        .join(", ")
}
