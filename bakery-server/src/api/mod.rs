//! API 路由模块
//!
//! # 结构
//!
//! - [`health`] - 健康检查
//! - [`auth`] - 注册、登录、当前用户
//! - [`users`] - 用户资料
//! - [`products`] - 商品目录 (读公开，写仅管理员)
//! - [`orders`] - 订单创建、查询、状态流转、SSE 事件流

pub mod auth;
pub mod health;
pub mod orders;
pub mod products;
pub mod users;

// Re-export common types for handlers
pub use crate::utils::{AppResult, AppError};
