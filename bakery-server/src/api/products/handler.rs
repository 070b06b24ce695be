//! Product API Handlers

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;

use shared::models::{Product, ProductCreate, ProductUpdate};

use crate::auth::CurrentUser;
use crate::core::ServerState;
use crate::db::repository::product as product_repo;
use crate::orders::money::MAX_PRICE;
use crate::utils::validation::{
    MAX_NAME_LEN, MAX_NOTE_LEN, MAX_URL_LEN, validate_optional_text, validate_required_text,
};
use crate::utils::{AppError, AppResult};

/// Query params for listing products
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub featured: bool,
}

fn validate_price(price: f64) -> AppResult<()> {
    if !price.is_finite() || price < 0.0 {
        return Err(AppError::validation("price must be a non-negative number"));
    }
    if price > MAX_PRICE {
        return Err(AppError::validation(format!(
            "price exceeds the maximum allowed ({MAX_PRICE})"
        )));
    }
    Ok(())
}

fn validate_stock(stock: i64) -> AppResult<()> {
    if stock < 0 {
        return Err(AppError::validation("stock must not be negative"));
    }
    Ok(())
}

/// GET /api/products - 获取商品列表 (公开，?featured=true 过滤)
pub async fn list(
    State(state): State<ServerState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<Product>>> {
    let products = product_repo::find_all(&state.db, query.featured).await?;
    Ok(Json(products))
}

/// GET /api/products/:id - 获取单个商品 (公开)
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Product>> {
    let product = product_repo::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Product {id} not found")))?;
    Ok(Json(product))
}

/// POST /api/products - 创建商品 (仅管理员)
pub async fn create(
    State(state): State<ServerState>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<ProductCreate>,
) -> AppResult<(StatusCode, Json<Product>)> {
    if !user.is_admin() {
        return Err(AppError::forbidden("Admin role required"));
    }
    validate_required_text(&payload.name, "name", MAX_NAME_LEN)?;
    validate_optional_text(&payload.description, "description", MAX_NOTE_LEN)?;
    validate_optional_text(&payload.category, "category", MAX_NAME_LEN)?;
    validate_optional_text(&payload.image_url, "imageUrl", MAX_URL_LEN)?;
    validate_price(payload.price)?;
    validate_stock(payload.stock)?;

    let product = product_repo::create(&state.db, payload).await?;
    tracing::info!(product_id = %product.id, name = %product.name, "Product created");
    Ok((StatusCode::CREATED, Json(product)))
}

/// PUT /api/products/:id - 更新商品 (仅管理员)
///
/// Stock here is a direct administrative set, validated non-negative;
/// order creation is the only other writer.
pub async fn update(
    State(state): State<ServerState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<ProductUpdate>,
) -> AppResult<Json<Product>> {
    if !user.is_admin() {
        return Err(AppError::forbidden("Admin role required"));
    }
    if let Some(name) = &payload.name {
        validate_required_text(name, "name", MAX_NAME_LEN)?;
    }
    validate_optional_text(&payload.description, "description", MAX_NOTE_LEN)?;
    validate_optional_text(&payload.category, "category", MAX_NAME_LEN)?;
    validate_optional_text(&payload.image_url, "imageUrl", MAX_URL_LEN)?;
    if let Some(price) = payload.price {
        validate_price(price)?;
    }
    if let Some(stock) = payload.stock {
        validate_stock(stock)?;
    }

    let product = product_repo::update(&state.db, id, payload).await?;
    Ok(Json(product))
}

/// DELETE /api/products/:id - 删除商品 (仅管理员)
pub async fn delete(
    State(state): State<ServerState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    if !user.is_admin() {
        return Err(AppError::forbidden("Admin role required"));
    }
    product_repo::delete(&state.db, id).await?;
    tracing::info!(product_id = %id, "Product deleted");
    Ok(StatusCode::NO_CONTENT)
}
