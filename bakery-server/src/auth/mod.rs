//! Authentication
//!
//! JWT + Argon2 认证体系：令牌服务、密码哈希、请求中间件。

pub mod jwt;
pub mod middleware;
pub mod password;

pub use jwt::{Claims, CurrentUser, JwtConfig, JwtError, JwtService};
pub use middleware::{require_admin, require_auth};
pub use password::{hash_password, verify_password};
