//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存与秒杀系统的错误类型和处理机制。

use thiserror::Error;

/// 系统错误类型枚举
///
/// 缓存未命中、库存不足、重复下单属于正常业务结果，不在此列
#[derive(Error, Debug)]
pub enum FlashError {
    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 远程存储命令失败
    #[error("Remote store operation failed: {0}")]
    Store(String),

    /// 服务端脚本执行失败或返回了约定之外的结果
    #[error("Script execution failed: {0}")]
    Script(String),

    /// 在有限次重试后仍未获取到分布式锁
    #[error("Lock unavailable: {0}")]
    LockUnavailable(String),

    /// 订单队列已关闭
    #[error("Order queue closed: {0}")]
    QueueClosed(String),

    /// 当日序列号超出32位范围
    #[error("Id sequence exhausted: {0}")]
    IdExhausted(String),

    /// 调用参数不合法
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    /// 数据库错误（非sea-orm来源）
    #[error("Database error: {0}")]
    Database(String),

    /// Sea-ORM数据库错误
    #[error("Sea-ORM error: {0}")]
    SeaOrm(#[from] sea_orm::DbErr),

    /// Redis错误
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// 超时错误
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// IO错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 操作结果类型别名
pub type Result<T> = std::result::Result<T, FlashError>;
