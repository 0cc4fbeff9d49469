//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 关系型存储模块
//!
//! 负责连接建立与建表，并提供商铺、代金券仓储和订单落库事务。
//! 支持 SQLite、MySQL 和 PostgreSQL。

pub mod order_store;
pub mod repository;
pub mod schema;
pub mod unit_of_work;

use crate::config::DatabaseConfig;
use crate::error::{FlashError, Result};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use secrecy::ExposeSecret;
use std::time::Duration;
use tracing::info;

pub use order_store::{OrderStore, SqlOrderStore};
pub use repository::{ShopRepository, VoucherRepository};
pub use schema::ensure_schema;
pub use unit_of_work::UnitOfWork;

/// 数据库类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbType {
    SQLite,
    MySQL,
    PostgreSQL,
}

impl DbType {
    /// 从连接字符串推断数据库类型
    pub fn from_connection_string(s: &str) -> Self {
        let lower = s.to_lowercase();
        if lower.starts_with("mysql") {
            DbType::MySQL
        } else if lower.starts_with("postgres") {
            DbType::PostgreSQL
        } else {
            DbType::SQLite
        }
    }
}

/// SQLite 连接的空闲与存活上限，远大于进程的预期运行时长
const SQLITE_CONNECTION_LIFETIME: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// 按配置生成连接池参数
///
/// SQLite 固定使用单连接，内存库的每个连接都是独立的数据库。
/// 连接被回收后重新打开的内存库没有任何表，因此显式放宽空闲回收与存活上限，
/// 使唯一连接在进程生命周期内不被替换。
pub fn connect_options(config: &DatabaseConfig) -> ConnectOptions {
    let url = config.url.expose_secret();
    let mut opt = ConnectOptions::new(url.to_string());
    opt.connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .sqlx_logging(false);
    if DbType::from_connection_string(url) == DbType::SQLite {
        opt.max_connections(1)
            .min_connections(1)
            .idle_timeout(SQLITE_CONNECTION_LIFETIME)
            .max_lifetime(SQLITE_CONNECTION_LIFETIME);
    } else {
        opt.max_connections(config.max_connections)
            .min_connections(config.min_connections);
    }
    opt
}

/// 建立连接池，按配置决定是否建表
pub async fn connect(config: &DatabaseConfig) -> Result<DatabaseConnection> {
    let db_type = DbType::from_connection_string(config.url.expose_secret());
    let opt = connect_options(config);

    let db = Database::connect(opt)
        .await
        .map_err(|e| FlashError::Database(format!("Failed to open database: {}", e)))?;
    info!("Connected to {:?} database", db_type);

    if config.auto_create_schema {
        ensure_schema(&db).await?;
    }
    Ok(db)
}
