//! Product Repository
//!
//! Plain catalog CRUD. Stock is only ever written here by the
//! administrative update (validated non-negative by the handler); the
//! order path decrements it inside its own transaction in
//! [`super::order`].

use shared::models::{Product, ProductCreate, ProductUpdate};
use shared::util::{now_millis, snowflake_id};
use sqlx::SqlitePool;

use super::{RepoError, RepoResult};

const PRODUCT_SELECT: &str = "SELECT id, name, description, price, stock, category, image_url, \
     featured, created_at, updated_at FROM product";

pub async fn find_all(pool: &SqlitePool, featured_only: bool) -> RepoResult<Vec<Product>> {
    let sql = if featured_only {
        format!("{PRODUCT_SELECT} WHERE featured = 1 ORDER BY category, name")
    } else {
        format!("{PRODUCT_SELECT} ORDER BY category, name")
    };
    let products = sqlx::query_as::<_, Product>(&sql).fetch_all(pool).await?;
    Ok(products)
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Product>> {
    let sql = format!("{PRODUCT_SELECT} WHERE id = ?");
    let product = sqlx::query_as::<_, Product>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(product)
}

pub async fn create(pool: &SqlitePool, data: ProductCreate) -> RepoResult<Product> {
    let now = now_millis();
    let id = snowflake_id();
    sqlx::query(
        "INSERT INTO product (id, name, description, price, stock, category, image_url, featured, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(&data.name)
    .bind(&data.description)
    .bind(data.price)
    .bind(data.stock)
    .bind(data.category.as_deref().unwrap_or("general"))
    .bind(&data.image_url)
    .bind(data.featured.unwrap_or(false))
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create product".into()))
}

pub async fn update(pool: &SqlitePool, id: i64, data: ProductUpdate) -> RepoResult<Product> {
    let now = now_millis();
    let rows = sqlx::query(
        "UPDATE product SET name = COALESCE(?1, name), description = COALESCE(?2, description), \
         price = COALESCE(?3, price), stock = COALESCE(?4, stock), category = COALESCE(?5, category), \
         image_url = COALESCE(?6, image_url), featured = COALESCE(?7, featured), updated_at = ?8 \
         WHERE id = ?9",
    )
    .bind(&data.name)
    .bind(&data.description)
    .bind(data.price)
    .bind(data.stock)
    .bind(&data.category)
    .bind(&data.image_url)
    .bind(data.featured)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Product {id} not found")));
    }
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Product {id} not found")))
}

pub async fn delete(pool: &SqlitePool, id: i64) -> RepoResult<()> {
    let result = sqlx::query("DELETE FROM product WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await;

    match result {
        Ok(rows) if rows.rows_affected() == 0 => {
            Err(RepoError::NotFound(format!("Product {id} not found")))
        }
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(db)) if db.message().contains("FOREIGN KEY constraint") => {
            Err(RepoError::Duplicate(
                "Product is referenced by existing orders".into(),
            ))
        }
        Err(e) => Err(e.into()),
    }
}
