//! Bakery Server - 面包房电商后端
//!
//! # 模块结构
//!
//! ```text
//! bakery-server/src/
//! ├── core/          # 配置、状态、服务器
//! ├── auth/          # JWT 认证、密码哈希、中间件
//! ├── api/           # HTTP 路由和处理器
//! ├── db/            # SQLite 连接池、迁移、仓储
//! ├── orders/        # 订单核心 (组装、生命周期、金额)
//! ├── notify/        # 事件广播 (SSE) 和邮件通知
//! └── utils/         # 错误、日志、校验
//! ```

pub mod api;
pub mod auth;
pub mod core;
pub mod db;
pub mod notify;
pub mod orders;
pub mod utils;

// Re-export 公共类型
pub use auth::{CurrentUser, JwtService};
pub use core::{Config, Server, ServerState};
pub use notify::{Notifier, OrderEvents};
pub use utils::{AppError, AppResult};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};

/// 设置运行环境 (dotenv + 日志)
pub fn setup_environment() {
    dotenv::dotenv().ok();
    let log_level = std::env::var("LOG_LEVEL").ok();
    init_logger_with_file(log_level.as_deref(), None);
}

pub fn print_banner() {
    println!(
        r#"
    ____        __
   / __ )____ _/ /_____  _______  __
  / __  / __ `/ //_/ _ \/ ___/ / / /
 / /_/ / /_/ / ,< /  __/ /  / /_/ /
/_____/\__,_/_/|_|\___/_/   \__, /
                           /____/
    "#
    );
}
