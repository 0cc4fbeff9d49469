//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了通用的读穿透缓存客户端。
//!
//! 提供三种读取策略：
//! - 空值缓存（防穿透）：`query_with_pass_through`
//! - 逻辑过期（防击穿，永不阻塞）：`query_with_logical_expire`
//! - 互斥锁重建（防击穿，有界等待）：`query_with_mutex`

pub mod entry;

use crate::backend::RemoteStore;
use crate::config::{CacheConfig, RetryPolicy};
use crate::error::{FlashError, Result};
use crate::lock::{DistributedLock, LockToken};
use crate::metrics::GLOBAL_METRICS;
use crate::serialization::{JsonSerializer, Serializer};
use chrono::Utc;
use futures::FutureExt;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn};

pub use entry::{CacheLookup, LogicalEntry, NULL_MARKER};

/// 读穿透缓存客户端
///
/// 克隆开销很小，所有克隆共享同一组重建任务
#[derive(Clone)]
pub struct CacheClient {
    store: Arc<dyn RemoteStore>,
    serializer: JsonSerializer,
    lock: DistributedLock,
    null_ttl: Duration,
    rebuild_lock_ttl: Duration,
    rebuild_permits: Arc<Semaphore>,
    rebuilds: TaskTracker,
}

impl CacheClient {
    pub fn new(store: Arc<dyn RemoteStore>, config: &CacheConfig) -> Self {
        Self {
            lock: DistributedLock::new(store.clone(), config.lock_prefix.clone()),
            store,
            serializer: JsonSerializer::new(),
            null_ttl: config.null_ttl(),
            rebuild_lock_ttl: config.rebuild_lock_ttl(),
            rebuild_permits: Arc::new(Semaphore::new(config.rebuild_concurrency.max(1))),
            rebuilds: TaskTracker::new(),
        }
    }

    /// 写入普通缓存，带物理过期时间
    #[instrument(skip(self, value), level = "debug")]
    pub async fn write<T: Serialize + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let payload = self.serializer.serialize(value)?;
        self.store.set(key, &payload, Some(ttl)).await
    }

    /// 写入逻辑过期缓存，不设物理过期时间
    #[instrument(skip(self, value), level = "debug")]
    pub async fn write_with_logical_expiry<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<()> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| FlashError::Config(format!("logical ttl out of range: {}", e)))?;
        let entry = LogicalEntry::new(value, Utc::now() + ttl);
        let payload = self.serializer.serialize(&entry)?;
        self.store.set(key, &payload, None).await
    }

    /// 删除缓存
    #[instrument(skip(self), level = "debug")]
    pub async fn invalidate(&self, key: &str) -> Result<bool> {
        let removed = self.store.delete(key).await?;
        GLOBAL_METRICS.record("cache", "invalidate", if removed { "ok" } else { "absent" });
        Ok(removed)
    }

    /// 读取普通缓存并分类（不会返回 Stale）
    pub async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Result<CacheLookup<T>> {
        let lookup = match self.store.get(key).await? {
            None => CacheLookup::Miss,
            Some(raw) if raw.trim().is_empty() => CacheLookup::NullMarker,
            Some(raw) => CacheLookup::Fresh(self.serializer.deserialize(&raw)?),
        };
        GLOBAL_METRICS.record("cache", "get", lookup.label());
        Ok(lookup)
    }

    /// 读取逻辑过期缓存并分类（空值标记按未命中处理）
    pub async fn lookup_logical<T: DeserializeOwned>(&self, key: &str) -> Result<CacheLookup<T>> {
        let lookup = match self.store.get(key).await? {
            Some(raw) if !raw.trim().is_empty() => {
                let entry: LogicalEntry<T> = self.serializer.deserialize(&raw)?;
                if entry.is_fresh_at(Utc::now()) {
                    CacheLookup::Fresh(entry.data)
                } else {
                    CacheLookup::Stale(entry.data)
                }
            }
            _ => CacheLookup::Miss,
        };
        GLOBAL_METRICS.record("cache", "get_logical", lookup.label());
        Ok(lookup)
    }

    /// 空值缓存策略
    ///
    /// 未命中时调用 `fallback`；记录不存在则写入空值标记（短有效期），
    /// 标记有效期内的再次读取不会访问权威存储
    #[instrument(skip(self, fallback), level = "debug")]
    pub async fn query_with_pass_through<T, ID, F, Fut>(
        &self,
        key_prefix: &str,
        id: ID,
        fallback: F,
        ttl: Duration,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        ID: Display + std::fmt::Debug + Send,
        F: FnOnce(ID) -> Fut + Send,
        Fut: Future<Output = Result<Option<T>>> + Send,
    {
        let key = format!("{}{}", key_prefix, id);
        match self.lookup::<T>(&key).await? {
            CacheLookup::Fresh(value) | CacheLookup::Stale(value) => return Ok(Some(value)),
            CacheLookup::NullMarker => return Ok(None),
            CacheLookup::Miss => {}
        }

        self.fill(&key, id, fallback, ttl).await
    }

    /// 互斥锁重建策略
    ///
    /// 未命中时只有获得重建锁的调用方访问权威存储，其余调用方按 `retry`
    /// 等待后重读缓存；超过最大尝试次数返回 [`FlashError::LockUnavailable`]
    #[instrument(skip(self, fallback, retry), level = "debug")]
    pub async fn query_with_mutex<T, ID, F, Fut>(
        &self,
        key_prefix: &str,
        id: ID,
        fallback: F,
        ttl: Duration,
        retry: &RetryPolicy,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        ID: Display + std::fmt::Debug + Send,
        F: FnOnce(ID) -> Fut + Send,
        Fut: Future<Output = Result<Option<T>>> + Send,
    {
        let key = format!("{}{}", key_prefix, id);
        let attempts = retry.max_attempts.max(1);

        for attempt in 1..=attempts {
            match self.lookup::<T>(&key).await? {
                CacheLookup::Fresh(value) | CacheLookup::Stale(value) => return Ok(Some(value)),
                CacheLookup::NullMarker => return Ok(None),
                CacheLookup::Miss => {}
            }

            if let Some(token) = self.lock.try_lock(&key, self.rebuild_lock_ttl).await? {
                let result = self.fill_locked(&key, id, fallback, ttl).await;
                self.release(&token).await;
                return result;
            }

            debug!("Rebuild of {} in progress, attempt {}/{}", key, attempt, attempts);
            if attempt < attempts {
                tokio::time::sleep(retry.delay()).await;
            }
        }

        GLOBAL_METRICS.record("cache", "mutex", "exhausted");
        Err(FlashError::LockUnavailable(format!(
            "rebuild lock for {} still held after {} attempts",
            key, attempts
        )))
    }

    /// 持有重建锁时的二次检查与回源
    async fn fill_locked<T, ID, F, Fut>(
        &self,
        key: &str,
        id: ID,
        fallback: F,
        ttl: Duration,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce(ID) -> Fut + Send,
        Fut: Future<Output = Result<Option<T>>> + Send,
    {
        match self.lookup::<T>(key).await? {
            CacheLookup::Fresh(value) | CacheLookup::Stale(value) => Ok(Some(value)),
            CacheLookup::NullMarker => Ok(None),
            CacheLookup::Miss => self.fill(key, id, fallback, ttl).await,
        }
    }

    /// 回源并写入缓存或空值标记
    async fn fill<T, ID, F, Fut>(&self, key: &str, id: ID, fallback: F, ttl: Duration) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce(ID) -> Fut + Send,
        Fut: Future<Output = Result<Option<T>>> + Send,
    {
        match fallback(id).await? {
            Some(value) => {
                self.write(key, &value, ttl).await?;
                GLOBAL_METRICS.record("cache", "fill", "value");
                Ok(Some(value))
            }
            None => {
                self.store.set(key, NULL_MARKER, Some(self.null_ttl)).await?;
                GLOBAL_METRICS.record("cache", "fill", "null");
                Ok(None)
            }
        }
    }

    /// 逻辑过期策略
    ///
    /// 键不存在直接返回 None（要求预热）。值已过期时，获得重建锁的调用方
    /// 二次检查后提交异步重建；所有调用方都立即返回当前值，可能是旧值
    #[instrument(skip(self, fallback), level = "debug")]
    pub async fn query_with_logical_expire<T, ID, F, Fut>(
        &self,
        key_prefix: &str,
        id: ID,
        fallback: F,
        ttl: Duration,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        ID: Display + std::fmt::Debug + Send + 'static,
        F: FnOnce(ID) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<T>>> + Send + 'static,
    {
        let key = format!("{}{}", key_prefix, id);
        let stale = match self.lookup_logical::<T>(&key).await? {
            CacheLookup::Fresh(value) => return Ok(Some(value)),
            CacheLookup::Stale(value) => value,
            CacheLookup::Miss | CacheLookup::NullMarker => return Ok(None),
        };

        let Some(token) = self.lock.try_lock(&key, self.rebuild_lock_ttl).await? else {
            return Ok(Some(stale));
        };

        // 加锁前可能刚好有重建完成
        match self.lookup_logical::<T>(&key).await {
            Ok(CacheLookup::Fresh(value)) => {
                self.release(&token).await;
                return Ok(Some(value));
            }
            Ok(_) => {}
            Err(e) => {
                self.release(&token).await;
                return Err(e);
            }
        }

        self.spawn_rebuild(key, id, fallback, ttl, token);
        Ok(Some(stale))
    }

    /// 提交异步重建，重建锁在任何退出路径上释放
    fn spawn_rebuild<T, ID, F, Fut>(&self, key: String, id: ID, fallback: F, ttl: Duration, token: LockToken)
    where
        T: Serialize + Send + Sync + 'static,
        ID: Send + 'static,
        F: FnOnce(ID) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<T>>> + Send + 'static,
    {
        let client = self.clone();
        self.rebuilds.spawn(async move {
            let _permit = match client.rebuild_permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    client.release(&token).await;
                    return;
                }
            };

            let rebuild = async {
                match fallback(id).await? {
                    Some(value) => client.write_with_logical_expiry(&key, &value, ttl).await,
                    None => client.store.delete(&key).await.map(|_| ()),
                }
            };

            match AssertUnwindSafe(rebuild).catch_unwind().await {
                Ok(Ok(())) => {
                    GLOBAL_METRICS.record("cache", "rebuild", "ok");
                    debug!("Rebuilt {}", key);
                }
                Ok(Err(e)) => {
                    GLOBAL_METRICS.record("cache", "rebuild", "failed");
                    warn!("Rebuild of {} failed: {}", key, e);
                }
                Err(_) => {
                    GLOBAL_METRICS.record("cache", "rebuild", "panicked");
                    error!("Rebuild of {} panicked", key);
                }
            }
            client.release(&token).await;
        });
    }

    async fn release(&self, token: &LockToken) {
        if let Err(e) = self.lock.unlock(token).await {
            warn!("Failed to release {}: {}", token.lock_key, e);
        }
    }

    /// 等待当前所有重建任务结束，之后仍可提交新的重建
    pub async fn wait_rebuilds(&self) {
        self.rebuilds.close();
        self.rebuilds.wait().await;
        self.rebuilds.reopen();
    }

    /// 关闭客户端：等待在途重建结束
    pub async fn shutdown(&self) {
        self.rebuilds.close();
        self.rebuilds.wait().await;
        info!("Cache client stopped");
    }
}
