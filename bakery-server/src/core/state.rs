use std::sync::Arc;

use sqlx::SqlitePool;

use crate::auth::{self, JwtService};
use crate::core::Config;
use crate::db::DbService;
use crate::db::repository::user as user_repo;
use crate::notify::{EmailNotifier, NoopNotifier, Notifier, OrderEvents};
use crate::utils::AppError;

/// 服务器状态 - 持有所有服务的共享引用
///
/// 使用 Arc 实现浅拷贝，所有权成本极低。
///
/// | 字段 | 类型 | 说明 |
/// |------|------|------|
/// | config | Config | 配置项 (不可变) |
/// | db | SqlitePool | SQLite 连接池 |
/// | jwt_service | Arc<JwtService> | JWT 认证服务 |
/// | events | OrderEvents | 订单事件广播 |
/// | notifier | Arc<dyn Notifier> | 邮件通知 (可注入) |
#[derive(Clone)]
pub struct ServerState {
    /// 服务器配置
    pub config: Config,
    /// SQLite 连接池
    pub db: SqlitePool,
    /// JWT 认证服务
    pub jwt_service: Arc<JwtService>,
    /// 订单事件广播 (进程内注册表，启动时构造)
    pub events: OrderEvents,
    /// 邮件通知，启动时注入；测试可替换为记录桩
    pub notifier: Arc<dyn Notifier>,
}

impl ServerState {
    /// 创建服务器状态 (手动构造，测试常用)
    ///
    /// 通常使用 [`ServerState::initialize`] 代替
    pub fn new(
        config: Config,
        db: SqlitePool,
        jwt_service: Arc<JwtService>,
        events: OrderEvents,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            db,
            jwt_service,
            events,
            notifier,
        }
    }

    /// 初始化服务器状态
    ///
    /// 按顺序初始化：
    /// 1. 工作目录结构
    /// 2. 数据库 (work_dir/database/bakery.db，含迁移)
    /// 3. JWT、事件广播、邮件通知
    /// 4. 引导管理员账号
    pub async fn initialize(config: &Config) -> Result<Self, AppError> {
        config
            .ensure_work_dir_structure()
            .map_err(|e| AppError::internal(format!("Failed to create work directory: {e}")))?;

        let db_path = config.database_dir().join("bakery.db");
        let db_service = DbService::new(&db_path.to_string_lossy()).await?;

        let jwt_service = Arc::new(JwtService::with_config(config.jwt.clone()));
        let events = OrderEvents::new();

        let notifier: Arc<dyn Notifier> = match &config.mail_gateway_url {
            Some(url) => Arc::new(EmailNotifier::new(url.clone(), config.mail_from.clone())),
            None => {
                tracing::warn!("MAIL_GATEWAY_URL not configured, order emails disabled");
                Arc::new(NoopNotifier)
            }
        };

        let state = Self::new(
            config.clone(),
            db_service.pool,
            jwt_service,
            events,
            notifier,
        );
        state.bootstrap_admin().await?;

        Ok(state)
    }

    /// 启动时引导管理员账号 (注册接口永远不会产生 admin)
    async fn bootstrap_admin(&self) -> Result<(), AppError> {
        let (Some(email), Some(password)) =
            (&self.config.admin_email, &self.config.admin_password)
        else {
            tracing::warn!("ADMIN_EMAIL/ADMIN_PASSWORD not set, skipping admin bootstrap");
            return Ok(());
        };

        let hash = auth::hash_password(password)?;
        user_repo::ensure_admin(&self.db, &self.config.admin_name, email, &hash).await?;
        Ok(())
    }
}
