//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了系统的配置结构和解析逻辑。

use crate::error::{FlashError, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// 顶层配置
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub redis: RedisConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub seckill: SeckillConfig,
    pub id: IdConfig,
    pub telemetry: TelemetryConfig,
}

/// Redis模式
#[derive(Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RedisMode {
    #[default]
    Standalone,
    Cluster,
}

/// Redis配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis模式
    pub mode: RedisMode,
    /// 连接字符串（单机模式）
    pub connection_string: SecretString,
    /// 集群初始节点（集群模式）
    pub cluster_nodes: Vec<String>,
    /// Redis 密码（可选）
    pub password: Option<SecretString>,
    /// 是否启用 TLS
    pub enable_tls: bool,
    /// 连接超时时间（毫秒）
    pub connection_timeout_ms: u64,
    /// 命令执行超时时间（毫秒）
    pub command_timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            mode: RedisMode::Standalone,
            connection_string: SecretString::new("redis://localhost:6379".to_string().into()),
            cluster_nodes: Vec::new(),
            password: None,
            enable_tls: false,
            connection_timeout_ms: 5000,
            command_timeout_ms: 3000,
        }
    }
}

/// 关系型数据库配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct DatabaseConfig {
    /// 数据库URL（sqlite:/mysql:/postgres:）
    pub url: SecretString,
    pub max_connections: u32,
    pub min_connections: u32,
    /// 连接超时时间（秒）
    pub connect_timeout_secs: u64,
    /// 启动时是否自动建表
    pub auto_create_schema: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: SecretString::new("sqlite::memory:".to_string().into()),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
            auto_create_schema: true,
        }
    }
}

/// 有界重试策略
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct RetryPolicy {
    /// 最大尝试次数（包含第一次）
    pub max_attempts: u32,
    /// 两次尝试之间的固定等待（毫秒）
    pub delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay_ms: u64) -> Self {
        Self {
            max_attempts,
            delay_ms,
        }
    }

    /// 只尝试一次
    pub fn once() -> Self {
        Self::new(1, 0)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(20, 50)
    }
}

/// 缓存击穿防护策略
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheStrategy {
    /// 缓存空值，防止穿透
    PassThrough,
    /// 互斥锁重建
    Mutex,
    /// 逻辑过期（要求预热）
    #[default]
    LogicalExpire,
}

/// 缓存配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct CacheConfig {
    /// 商铺缓存键前缀
    pub shop_key_prefix: String,
    /// 商铺缓存有效期（秒）
    pub shop_ttl_secs: u64,
    /// 空值标记有效期（秒）
    pub null_ttl_secs: u64,
    /// 锁键前缀
    pub lock_prefix: String,
    /// 重建锁有效期（秒）
    pub rebuild_lock_ttl_secs: u64,
    /// 同时运行的异步重建任务上限
    pub rebuild_concurrency: usize,
    /// 商铺查询使用的策略
    pub strategy: CacheStrategy,
    /// 互斥锁策略的重试参数
    pub mutex_retry: RetryPolicy,
}

impl CacheConfig {
    pub fn shop_ttl(&self) -> Duration {
        Duration::from_secs(self.shop_ttl_secs)
    }

    pub fn null_ttl(&self) -> Duration {
        Duration::from_secs(self.null_ttl_secs)
    }

    pub fn rebuild_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.rebuild_lock_ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            shop_key_prefix: "cache:shop:".to_string(),
            shop_ttl_secs: 30 * 60,
            null_ttl_secs: 2 * 60,
            lock_prefix: "lock:".to_string(),
            rebuild_lock_ttl_secs: 10,
            rebuild_concurrency: 10,
            strategy: CacheStrategy::LogicalExpire,
            mutex_retry: RetryPolicy::default(),
        }
    }
}

/// 秒杀配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct SeckillConfig {
    /// 库存计数键前缀
    pub stock_key_prefix: String,
    /// 下单用户集合键前缀
    pub order_key_prefix: String,
    /// 订单队列容量
    pub queue_capacity: usize,
    /// 用户级订单锁有效期（秒）
    pub order_lock_ttl_secs: u64,
    /// 订单锁获取重试参数
    pub lock_retry: RetryPolicy,
    /// 订单号业务前缀
    pub id_prefix: String,
    /// 关闭时等待队列排空的最长时间（毫秒）
    pub shutdown_timeout_ms: u64,
}

impl SeckillConfig {
    pub fn order_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.order_lock_ttl_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Default for SeckillConfig {
    fn default() -> Self {
        Self {
            stock_key_prefix: "seckill:stock:".to_string(),
            order_key_prefix: "seckill:order:".to_string(),
            queue_capacity: 1024 * 1024,
            order_lock_ttl_secs: 10,
            lock_retry: RetryPolicy::new(3, 50),
            id_prefix: "order".to_string(),
            shutdown_timeout_ms: 30_000,
        }
    }
}

/// 全局ID生成器配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct IdConfig {
    /// 自定义纪元（Unix秒）
    pub epoch_seconds: i64,
    /// 自增计数键前缀
    pub counter_prefix: String,
}

impl Default for IdConfig {
    fn default() -> Self {
        Self {
            // 2022-01-01T00:00:00Z
            epoch_seconds: 1_640_995_200,
            counter_prefix: "icr:".to_string(),
        }
    }
}

/// 日志与链路追踪配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct TelemetryConfig {
    pub service_name: String,
    /// EnvFilter 语法，RUST_LOG 优先
    pub log_filter: String,
    /// 是否挂载 OpenTelemetry 层
    pub enable_opentelemetry: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "oxflash".to_string(),
            log_filter: "info".to_string(),
            enable_opentelemetry: false,
        }
    }
}

impl Config {
    /// 从TOML文本解析并验证配置
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).map_err(|e| FlashError::Config(e.to_string()))?;
        config.validate().map_err(FlashError::Config)?;
        Ok(config)
    }

    /// 从文件读取配置
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// 验证配置
    ///
    /// 检查所有时间、容量与重试参数是否在合理范围内
    pub fn validate(&self) -> std::result::Result<(), String> {
        let redis = &self.redis;
        if !(100..=30000).contains(&redis.connection_timeout_ms) {
            return Err("redis.connection_timeout_ms must be between 100 and 30000 ms".to_string());
        }
        if !(100..=60000).contains(&redis.command_timeout_ms) {
            return Err("redis.command_timeout_ms must be between 100 and 60000 ms".to_string());
        }
        if redis.mode == RedisMode::Cluster && redis.cluster_nodes.is_empty() {
            return Err("redis.cluster_nodes cannot be empty in cluster mode".to_string());
        }

        if self.database.max_connections == 0 {
            return Err("database.max_connections cannot be zero".to_string());
        }
        if self.database.min_connections > self.database.max_connections {
            return Err("database.min_connections cannot exceed max_connections".to_string());
        }

        let cache = &self.cache;
        if cache.shop_ttl_secs == 0 {
            return Err("cache.shop_ttl_secs cannot be zero".to_string());
        }
        if cache.null_ttl_secs == 0 {
            return Err("cache.null_ttl_secs cannot be zero".to_string());
        }
        if cache.null_ttl_secs > cache.shop_ttl_secs {
            return Err("cache.null_ttl_secs must be <= cache.shop_ttl_secs".to_string());
        }
        if cache.rebuild_lock_ttl_secs == 0 {
            return Err("cache.rebuild_lock_ttl_secs cannot be zero".to_string());
        }
        if cache.rebuild_concurrency == 0 {
            return Err("cache.rebuild_concurrency cannot be zero".to_string());
        }
        if cache.mutex_retry.max_attempts == 0 {
            return Err("cache.mutex_retry.max_attempts cannot be zero".to_string());
        }

        let seckill = &self.seckill;
        if seckill.queue_capacity == 0 {
            return Err("seckill.queue_capacity cannot be zero".to_string());
        }
        if seckill.order_lock_ttl_secs == 0 {
            return Err("seckill.order_lock_ttl_secs cannot be zero".to_string());
        }
        if seckill.lock_retry.max_attempts == 0 {
            return Err("seckill.lock_retry.max_attempts cannot be zero".to_string());
        }
        if seckill.id_prefix.is_empty() {
            return Err("seckill.id_prefix cannot be empty".to_string());
        }

        if self.id.epoch_seconds < 0 {
            return Err("id.epoch_seconds cannot be negative".to_string());
        }

        Ok(())
    }
}
