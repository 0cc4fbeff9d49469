//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于远程存储的分布式互斥锁。
//!
//! 加锁使用 `SET NX PX`，解锁使用比较并删除脚本，
//! 因此锁过期后被他人重新获取时，旧持有者的解锁不会误删新锁。

use crate::backend::{RemoteStore, UNLOCK_SCRIPT};
use crate::config::RetryPolicy;
use crate::error::{FlashError, Result};
use crate::metrics::GLOBAL_METRICS;
use lazy_static::lazy_static;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

lazy_static! {
    /// 进程唯一标识，进程启动时随机生成一次
    static ref PROCESS_ID: String = uuid::Uuid::new_v4().simple().to_string();
}

static ACQUISITION_SEQ: AtomicU64 = AtomicU64::new(0);

/// 生成本次加锁使用的持有者令牌
///
/// 任务可能在线程间迁移，所以以“一次加锁”作为执行单元
fn next_owner_token() -> String {
    let seq = ACQUISITION_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}", *PROCESS_ID, seq)
}

/// 已获取的锁
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    pub lock_key: String,
    pub owner_token: String,
    pub ttl: Duration,
}

/// 分布式锁服务
#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn RemoteStore>,
    prefix: String,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn RemoteStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    pub fn lock_key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// 尝试获取锁，仅在本次调用创建了锁键时返回令牌
    #[instrument(skip(self), level = "debug")]
    pub async fn try_lock(&self, name: &str, ttl: Duration) -> Result<Option<LockToken>> {
        let lock_key = self.lock_key(name);
        let owner_token = next_owner_token();
        let acquired = self.store.set_if_absent(&lock_key, &owner_token, ttl).await?;

        GLOBAL_METRICS.record("lock", "acquire", if acquired { "ok" } else { "busy" });
        if !acquired {
            debug!("Lock {} is held by another owner", lock_key);
            return Ok(None);
        }
        Ok(Some(LockToken {
            lock_key,
            owner_token,
            ttl,
        }))
    }

    /// 释放锁
    ///
    /// 只有当前存储值等于令牌时才删除，返回是否删除
    #[instrument(skip(self, token), level = "debug", fields(lock_key = %token.lock_key))]
    pub async fn unlock(&self, token: &LockToken) -> Result<bool> {
        let released = self
            .store
            .eval(
                &UNLOCK_SCRIPT,
                &[token.lock_key.clone()],
                &[token.owner_token.clone()],
            )
            .await?;

        let released = released == 1;
        if !released {
            warn!(
                "Lock {} was no longer owned by {}; unlock skipped",
                token.lock_key, token.owner_token
            );
        }
        GLOBAL_METRICS.record("lock", "release", if released { "ok" } else { "stale" });
        Ok(released)
    }

    /// 在有界重试内获取锁
    ///
    /// 超过最大尝试次数后返回 [`FlashError::LockUnavailable`]
    #[instrument(skip(self, policy), level = "debug")]
    pub async fn lock_with_retry(
        &self,
        name: &str,
        ttl: Duration,
        policy: &RetryPolicy,
    ) -> Result<LockToken> {
        let attempts = policy.max_attempts.max(1);
        for attempt in 1..=attempts {
            if let Some(token) = self.try_lock(name, ttl).await? {
                return Ok(token);
            }
            if attempt < attempts {
                tokio::time::sleep(policy.delay()).await;
            }
        }
        Err(FlashError::LockUnavailable(format!(
            "{} after {} attempts",
            self.lock_key(name),
            attempts
        )))
    }
}
