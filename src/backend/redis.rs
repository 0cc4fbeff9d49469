//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于Redis的远程存储实现，支持单机与集群模式。

use super::script::StoreScript;
use super::RemoteStore;
use crate::config::{RedisConfig, RedisMode};
use crate::error::{FlashError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::{ConnectionLike, ConnectionManager};
use redis::cluster_async::ClusterConnection;
use redis::{Client, Cmd, FromRedisValue, Pipeline, RedisFuture};
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, instrument};

/// 单机或集群连接，两者都可廉价克隆
#[derive(Clone)]
enum StoreConnection {
    Standalone(ConnectionManager),
    Cluster(ClusterConnection),
}

impl ConnectionLike for StoreConnection {
    fn req_packed_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, redis::Value> {
        match self {
            StoreConnection::Standalone(conn) => conn.req_packed_command(cmd),
            StoreConnection::Cluster(conn) => conn.req_packed_command(cmd),
        }
    }

    fn req_packed_commands<'a>(
        &'a mut self,
        cmd: &'a Pipeline,
        offset: usize,
        count: usize,
    ) -> RedisFuture<'a, Vec<redis::Value>> {
        match self {
            StoreConnection::Standalone(conn) => conn.req_packed_commands(cmd, offset, count),
            StoreConnection::Cluster(conn) => conn.req_packed_commands(cmd, offset, count),
        }
    }

    fn get_db(&self) -> i64 {
        match self {
            StoreConnection::Standalone(conn) => conn.get_db(),
            StoreConnection::Cluster(conn) => conn.get_db(),
        }
    }
}

/// Redis远程存储
pub struct RedisStore {
    connection: StoreConnection,
    command_timeout: Duration,
    /// 按脚本名缓存的脚本对象（SHA1 只计算一次）
    scripts: DashMap<&'static str, redis::Script>,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.connection {
            StoreConnection::Standalone(_) => write!(f, "RedisStore::Standalone"),
            StoreConnection::Cluster(_) => write!(f, "RedisStore::Cluster"),
        }
    }
}

fn millis(ttl: Duration) -> u64 {
    // PX 不接受 0
    ttl.as_millis().clamp(1, u64::MAX as u128) as u64
}

impl RedisStore {
    /// 根据配置建立连接
    ///
    /// 单机模式的凭据写在连接字符串中；集群模式使用 `password` 字段
    #[instrument(skip(config), level = "info", fields(mode = ?config.mode))]
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let connect_timeout = Duration::from_millis(config.connection_timeout_ms);
        let connection = match config.mode {
            RedisMode::Standalone => {
                let raw = config.connection_string.expose_secret();
                let url = if config.enable_tls && !raw.starts_with("rediss://") {
                    raw.replace("redis://", "rediss://")
                } else {
                    raw.to_string()
                };
                let client = Client::open(url.as_str())?;
                let manager = timeout(connect_timeout, client.get_connection_manager())
                    .await
                    .map_err(|_| {
                        FlashError::Timeout(format!(
                            "Redis connection timed out after {}ms",
                            config.connection_timeout_ms
                        ))
                    })??;
                StoreConnection::Standalone(manager)
            }
            RedisMode::Cluster => {
                if config.cluster_nodes.is_empty() {
                    return Err(FlashError::Config(
                        "Cluster nodes are missing".to_string(),
                    ));
                }
                let mut builder = redis::cluster::ClusterClient::builder(config.cluster_nodes.clone());
                if let Some(password) = &config.password {
                    builder = builder.password(password.expose_secret().to_string());
                }
                let client = builder.build()?;
                let conn = timeout(connect_timeout, client.get_async_connection())
                    .await
                    .map_err(|_| {
                        FlashError::Timeout(format!(
                            "Redis cluster connection timed out after {}ms",
                            config.connection_timeout_ms
                        ))
                    })??;
                StoreConnection::Cluster(conn)
            }
        };

        info!("Redis store connected");
        Ok(Self {
            connection,
            command_timeout: Duration::from_millis(config.command_timeout_ms),
            scripts: DashMap::new(),
        })
    }

    /// 在命令超时内执行单条命令
    async fn query<T: FromRedisValue>(&self, cmd: &Cmd) -> Result<T> {
        let mut conn = self.connection.clone();
        timeout(self.command_timeout, cmd.query_async(&mut conn))
            .await
            .map_err(|_| {
                FlashError::Timeout(format!(
                    "Redis command timed out after {}ms",
                    self.command_timeout.as_millis()
                ))
            })?
            .map_err(FlashError::from)
    }

    fn script(&self, script: &StoreScript) -> redis::Script {
        self.scripts
            .entry(script.name())
            .or_insert_with(|| redis::Script::new(script.source()))
            .clone()
    }
}

#[async_trait]
impl RemoteStore for RedisStore {
    #[instrument(skip(self), level = "debug")]
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.query(redis::cmd("GET").arg(key)).await
    }

    #[instrument(skip(self, value), level = "debug", fields(value_len = value.len()))]
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(millis(ttl));
        }
        self.query::<()>(&cmd).await
    }

    #[instrument(skip(self, value), level = "debug")]
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let result: Option<String> = self
            .query(
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("NX")
                    .arg("PX")
                    .arg(millis(ttl)),
            )
            .await?;
        debug!("SET NX on {}: acquired={}", key, result.is_some());
        Ok(result.is_some())
    }

    #[instrument(skip(self), level = "debug")]
    async fn incr(&self, key: &str) -> Result<i64> {
        self.query(redis::cmd("INCR").arg(key)).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(&self, key: &str) -> Result<bool> {
        let removed: i64 = self.query(redis::cmd("DEL").arg(key)).await?;
        Ok(removed > 0)
    }

    #[instrument(skip(self), level = "debug")]
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let updated: i64 = self
            .query(redis::cmd("PEXPIRE").arg(key).arg(millis(ttl)))
            .await?;
        Ok(updated == 1)
    }

    #[instrument(skip(self, fields), level = "debug", fields(field_count = fields.len()))]
    async fn hash_set_all(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key);
        for (field, value) in fields {
            cmd.arg(field).arg(value);
        }
        self.query::<i64>(&cmd).await.map(|_| ())
    }

    #[instrument(skip(self), level = "debug")]
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        self.query(redis::cmd("HGETALL").arg(key)).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn zset_add(&self, key: &str, member: &str, score: f64) -> Result<bool> {
        let added: i64 = self
            .query(redis::cmd("ZADD").arg(key).arg(score).arg(member))
            .await?;
        Ok(added == 1)
    }

    #[instrument(skip(self), level = "debug")]
    async fn zset_remove(&self, key: &str, member: &str) -> Result<bool> {
        let removed: i64 = self.query(redis::cmd("ZREM").arg(key).arg(member)).await?;
        Ok(removed == 1)
    }

    #[instrument(skip(self), level = "debug")]
    async fn zset_score(&self, key: &str, member: &str) -> Result<Option<f64>> {
        self.query(redis::cmd("ZSCORE").arg(key).arg(member)).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn zset_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        self.query(redis::cmd("ZRANGE").arg(key).arg(start).arg(stop))
            .await
    }

    #[instrument(skip(self, script), level = "debug", fields(script = script.name()))]
    async fn eval(&self, script: &StoreScript, keys: &[String], args: &[String]) -> Result<i64> {
        let script = self.script(script);
        let mut invocation = script.prepare_invoke();
        for key in keys {
            invocation.key(key);
        }
        for arg in args {
            invocation.arg(arg);
        }

        let mut conn = self.connection.clone();
        let result: i64 = timeout(self.command_timeout, invocation.invoke_async(&mut conn))
            .await
            .map_err(|_| FlashError::Timeout("Redis script timed out".to_string()))?
            .map_err(|e| FlashError::Script(e.to_string()))?;
        Ok(result)
    }

    #[instrument(skip(self), level = "debug")]
    async fn ping(&self) -> Result<()> {
        let response: String = self.query(&redis::cmd("PING")).await?;
        debug!("Redis ping response: {}", response);
        Ok(())
    }
}
