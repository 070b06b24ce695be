//! Product Model

use serde::{Deserialize, Serialize};

use crate::util::id_string;

/// Product entity (bakery catalog item)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(with = "id_string")]
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    /// Catalog price in currency unit
    pub price: f64,
    /// Sellable units; decremented by order creation, never below zero
    pub stock: i64,
    pub category: String,
    pub image_url: Option<String>,
    pub featured: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Create product payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductCreate {
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub stock: i64,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub featured: Option<bool>,
}

/// Update product payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub stock: Option<i64>,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub featured: Option<bool>,
}
