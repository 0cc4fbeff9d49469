//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了全局唯一ID生成器。
//!
//! ID布局（63位正整数）：
//!
//! ```text
//! | 0 | 31 位：距纪元的秒数 | 32 位：当日序列号 |
//! ```
//!
//! 序列号来自远程存储中按“业务前缀 + 日期”分键的原子自增，
//! 计数键每天更换一次，序列随之自然归零。

use crate::backend::RemoteStore;
use crate::config::IdConfig;
use crate::error::{FlashError, Result};
use crate::metrics::GLOBAL_METRICS;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use tracing::{debug, instrument};

/// 序列号位数
pub const COUNT_BITS: u32 = 32;

const COUNT_MASK: i64 = (1 << COUNT_BITS) - 1;
const MAX_TIMESTAMP: i64 = (1 << 31) - 1;

/// ID生成器
#[derive(Clone)]
pub struct IdGenerator {
    store: Arc<dyn RemoteStore>,
    epoch_seconds: i64,
    counter_prefix: String,
}

impl IdGenerator {
    pub fn new(store: Arc<dyn RemoteStore>, config: &IdConfig) -> Self {
        Self {
            store,
            epoch_seconds: config.epoch_seconds,
            counter_prefix: config.counter_prefix.clone(),
        }
    }

    /// 按当前时间生成ID
    pub async fn next_id(&self, prefix: &str) -> Result<i64> {
        self.next_id_at(prefix, Utc::now()).await
    }

    /// 计数键：`icr:{prefix}:{yyyy:MM:dd}`
    pub fn counter_key(&self, prefix: &str, now: DateTime<Utc>) -> String {
        format!(
            "{}{}:{}",
            self.counter_prefix,
            prefix,
            now.format("%Y:%m:%d")
        )
    }

    /// 按给定时间生成ID
    #[instrument(skip(self), level = "debug")]
    pub async fn next_id_at(&self, prefix: &str, now: DateTime<Utc>) -> Result<i64> {
        let timestamp = now.timestamp() - self.epoch_seconds;
        if !(0..=MAX_TIMESTAMP).contains(&timestamp) {
            return Err(FlashError::IdExhausted(format!(
                "timestamp {} is outside the id epoch range",
                now
            )));
        }

        let key = self.counter_key(prefix, now);
        let count = self.store.incr(&key).await?;
        if !(1..=COUNT_MASK).contains(&count) {
            GLOBAL_METRICS.record("id", "next", "exhausted");
            return Err(FlashError::IdExhausted(format!(
                "counter {} reached {}",
                key, count
            )));
        }

        GLOBAL_METRICS.record("id", "next", "ok");
        let id = (timestamp << COUNT_BITS) | count;
        debug!("Generated id {} from {}", id, key);
        Ok(id)
    }
}

/// ID 的组成部分
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdParts {
    /// 距纪元的秒数
    pub timestamp: i64,
    /// 当日序列号
    pub sequence: u32,
}

impl IdParts {
    pub fn decompose(id: i64) -> Self {
        Self {
            timestamp: id >> COUNT_BITS,
            sequence: (id & COUNT_MASK) as u32,
        }
    }

    /// 还原生成时间（秒精度）
    pub fn created_at(&self, epoch_seconds: i64) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(epoch_seconds + self.timestamp, 0).single()
    }
}
