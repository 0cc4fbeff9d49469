//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了远程键值存储的接口。
//!
//! 缓存、分布式锁、ID生成器与秒杀准入都只通过 [`RemoteStore`] 访问共享状态，
//! 生产环境使用 [`redis::RedisStore`]，测试与单进程部署使用 [`memory::MemoryStore`]。

pub mod memory;
pub mod redis;
pub mod script;

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

pub use memory::MemoryStore;
pub use self::redis::RedisStore;
pub use script::{ScriptContext, StoreScript, SECKILL_SCRIPT, UNLOCK_SCRIPT};

/// 远程键值存储特征
///
/// 所有方法都是单次往返；`eval` 在服务端原子执行
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// 读取字符串值
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// 写入字符串值，`ttl` 为 None 时永不过期
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// 仅当键不存在时写入，返回是否由本次调用创建
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// 原子自增，返回自增后的值
    async fn incr(&self, key: &str) -> Result<i64>;

    /// 删除键，返回键是否存在
    async fn delete(&self, key: &str) -> Result<bool>;

    /// 设置过期时间，返回键是否存在
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// 批量写入哈希字段
    async fn hash_set_all(&self, key: &str, fields: &[(String, String)]) -> Result<()>;

    /// 读取哈希全部字段
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>>;

    /// 有序集合添加成员，返回是否为新成员
    async fn zset_add(&self, key: &str, member: &str, score: f64) -> Result<bool>;

    /// 有序集合移除成员，返回成员是否存在
    async fn zset_remove(&self, key: &str, member: &str) -> Result<bool>;

    /// 读取成员分数
    async fn zset_score(&self, key: &str, member: &str) -> Result<Option<f64>>;

    /// 按分数升序读取区间 [start, stop]，负数下标从尾部计数
    async fn zset_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>>;

    /// 原子执行服务端脚本，返回整数结果
    async fn eval(&self, script: &StoreScript, keys: &[String], args: &[String]) -> Result<i64>;

    /// 检查连接是否正常
    async fn ping(&self) -> Result<()>;
}
