//! Order Repository
//!
//! Order creation is the only multi-row write path and runs inside a
//! single transaction: stock is checked and decremented with a guarded
//! UPDATE, so concurrent orders for the same product can never drive
//! stock negative. Any failure rolls the whole transaction back — no
//! partial orders or partial decrements are ever observable.

use shared::models::{
    CreateOrderRequest, ItemQuantityUpdate, Order, OrderItemWithProduct, OrderStatus,
    OrderWithItems,
};
use shared::util::{now_millis, snowflake_id};
use sqlx::SqlitePool;

use super::{RepoError, RepoResult};
use crate::orders::money;

const ORDER_SELECT: &str = "SELECT id, user_id, status, total, payment_method, is_delivery, \
     delivery_address, rejection_reason, estimated_time, created_at, updated_at FROM orders";

const ITEM_SELECT: &str = "SELECT oi.id, oi.order_id, oi.product_id, oi.quantity, oi.price_unit, \
     oi.subtotal, p.name AS product_name, p.price AS product_price \
     FROM order_item oi JOIN product p ON p.id = oi.product_id";

/// Create an order with all of its lines, reserving inventory as it goes.
/// Returns the new order id; the caller re-reads the hydrated order after
/// commit.
pub async fn create(pool: &SqlitePool, user_id: i64, req: &CreateOrderRequest) -> RepoResult<i64> {
    let now = now_millis();
    let order_id = snowflake_id();
    let mut tx = pool.begin().await?;

    // Order row first so item rows can reference its id; the enforced
    // total is written once every line has been reserved.
    sqlx::query(
        "INSERT INTO orders (id, user_id, status, total, payment_method, is_delivery, delivery_address, created_at, updated_at) \
         VALUES (?, ?, ?, 0, ?, ?, ?, ?, ?)",
    )
    .bind(order_id)
    .bind(user_id)
    .bind(OrderStatus::Pending)
    .bind(&req.payment_method)
    .bind(req.is_delivery)
    .bind(&req.delivery_address)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let mut total = rust_decimal::Decimal::ZERO;
    for item in &req.items {
        // Read inside the transaction: a repeated product id in the same
        // request observes the stock already taken by its earlier
        // occurrence.
        let product: Option<(String, f64, i64)> =
            sqlx::query_as("SELECT name, price, stock FROM product WHERE id = ?")
                .bind(item.product_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((name, price, stock)) = product else {
            return Err(RepoError::ProductNotFound(item.product_id));
        };
        if item.quantity > stock {
            return Err(RepoError::InsufficientStock(name));
        }

        // Guarded decrement: the WHERE clause re-checks stock at write
        // time, so two in-flight orders for the same product cannot both
        // take the last unit.
        let updated = sqlx::query(
            "UPDATE product SET stock = stock - ?1, updated_at = ?2 WHERE id = ?3 AND stock >= ?1",
        )
        .bind(item.quantity)
        .bind(now)
        .bind(item.product_id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(RepoError::InsufficientStock(name));
        }

        // Unit price frozen here; later catalog price changes don't touch
        // what this order charges.
        let subtotal = money::line_subtotal(price, item.quantity);
        total += subtotal;
        sqlx::query(
            "INSERT INTO order_item (id, order_id, product_id, quantity, price_unit, subtotal, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(snowflake_id())
        .bind(order_id)
        .bind(item.product_id)
        .bind(item.quantity)
        .bind(price)
        .bind(money::to_f64(subtotal))
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("UPDATE orders SET total = ? WHERE id = ?")
        .bind(money::to_f64(total))
        .bind(order_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(order_id)
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Order>> {
    let sql = format!("{ORDER_SELECT} WHERE id = ?");
    let order = sqlx::query_as::<_, Order>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(order)
}

pub async fn find_with_items(pool: &SqlitePool, id: i64) -> RepoResult<Option<OrderWithItems>> {
    let Some(order) = find_by_id(pool, id).await? else {
        return Ok(None);
    };
    let sql = format!("{ITEM_SELECT} WHERE oi.order_id = ? ORDER BY oi.id");
    let items = sqlx::query_as::<_, OrderItemWithProduct>(&sql)
        .bind(id)
        .fetch_all(pool)
        .await?;
    Ok(Some(OrderWithItems { order, items }))
}

pub async fn find_by_user(pool: &SqlitePool, user_id: i64) -> RepoResult<Vec<OrderWithItems>> {
    let sql = format!("{ORDER_SELECT} WHERE user_id = ? ORDER BY created_at DESC");
    let orders = sqlx::query_as::<_, Order>(&sql)
        .bind(user_id)
        .fetch_all(pool)
        .await?;
    attach_items(pool, orders).await
}

pub async fn find_all(pool: &SqlitePool) -> RepoResult<Vec<OrderWithItems>> {
    let sql = format!("{ORDER_SELECT} ORDER BY created_at DESC");
    let orders = sqlx::query_as::<_, Order>(&sql).fetch_all(pool).await?;
    attach_items(pool, orders).await
}

async fn attach_items(
    pool: &SqlitePool,
    orders: Vec<Order>,
) -> RepoResult<Vec<OrderWithItems>> {
    let sql = format!("{ITEM_SELECT} WHERE oi.order_id = ? ORDER BY oi.id");
    let mut result = Vec::with_capacity(orders.len());
    for order in orders {
        let items = sqlx::query_as::<_, OrderItemWithProduct>(&sql)
            .bind(order.id)
            .fetch_all(pool)
            .await?;
        result.push(OrderWithItems { order, items });
    }
    Ok(result)
}

/// Persist a status transition. `rejection_reason` is stored as given —
/// `None` clears a previously stored reason, which is exactly what every
/// non-rejected transition wants.
pub async fn update_status(
    pool: &SqlitePool,
    id: i64,
    status: OrderStatus,
    rejection_reason: Option<&str>,
    estimated_time: Option<i64>,
) -> RepoResult<()> {
    let rows = sqlx::query(
        "UPDATE orders SET status = ?, rejection_reason = ?, \
         estimated_time = COALESCE(?, estimated_time), updated_at = ? WHERE id = ?",
    )
    .bind(status)
    .bind(rejection_reason)
    .bind(estimated_time)
    .bind(now_millis())
    .bind(id)
    .execute(pool)
    .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Order {id} not found")));
    }
    Ok(())
}

pub async fn set_delivery_address(pool: &SqlitePool, id: i64, address: &str) -> RepoResult<()> {
    let rows = sqlx::query("UPDATE orders SET delivery_address = ?, updated_at = ? WHERE id = ?")
        .bind(address)
        .bind(now_millis())
        .bind(id)
        .execute(pool)
        .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Order {id} not found")));
    }
    Ok(())
}

/// Adjust line quantities on a pending order. Quantity zero deletes the
/// line; otherwise the subtotal recomputes from the stored unit-price
/// snapshot, never from the live catalog price. The order total is
/// recomputed from whatever lines remain, inside the same transaction.
pub async fn update_item_quantities(
    pool: &SqlitePool,
    order_id: i64,
    updates: &[ItemQuantityUpdate],
) -> RepoResult<()> {
    let now = now_millis();
    let mut tx = pool.begin().await?;

    for upd in updates {
        if upd.quantity == 0 {
            let rows = sqlx::query("DELETE FROM order_item WHERE id = ? AND order_id = ?")
                .bind(upd.id)
                .bind(order_id)
                .execute(&mut *tx)
                .await?;
            if rows.rows_affected() == 0 {
                return Err(RepoError::NotFound(format!("Order item {} not found", upd.id)));
            }
        } else {
            let price_unit: Option<f64> =
                sqlx::query_scalar("SELECT price_unit FROM order_item WHERE id = ? AND order_id = ?")
                    .bind(upd.id)
                    .bind(order_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            let Some(price_unit) = price_unit else {
                return Err(RepoError::NotFound(format!("Order item {} not found", upd.id)));
            };
            let subtotal = money::to_f64(money::line_subtotal(price_unit, upd.quantity));
            sqlx::query(
                "UPDATE order_item SET quantity = ?, subtotal = ?, updated_at = ? WHERE id = ?",
            )
            .bind(upd.quantity)
            .bind(subtotal)
            .bind(now)
            .bind(upd.id)
            .execute(&mut *tx)
            .await?;
        }
    }

    let subtotals: Vec<f64> = sqlx::query_scalar("SELECT subtotal FROM order_item WHERE order_id = ?")
        .bind(order_id)
        .fetch_all(&mut *tx)
        .await?;
    let total = money::to_f64(money::order_total(subtotals.into_iter()));
    sqlx::query("UPDATE orders SET total = ?, updated_at = ? WHERE id = ?")
        .bind(total)
        .bind(now)
        .bind(order_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Hard delete; order lines go with it via ON DELETE CASCADE.
pub async fn delete(pool: &SqlitePool, id: i64) -> RepoResult<()> {
    let rows = sqlx::query("DELETE FROM orders WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Order {id} not found")));
    }
    Ok(())
}
