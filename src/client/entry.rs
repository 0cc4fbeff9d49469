//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存条目的存储形态与读取分类。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 空值标记，表示权威存储中不存在该记录
pub const NULL_MARKER: &str = "";

/// 带逻辑过期时间的缓存条目
///
/// 以无物理过期时间写入，是否陈旧只看 `expire_time`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogicalEntry<T> {
    pub data: T,
    pub expire_time: DateTime<Utc>,
}

impl<T> LogicalEntry<T> {
    pub fn new(data: T, expire_time: DateTime<Utc>) -> Self {
        Self { data, expire_time }
    }

    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        self.expire_time > now
    }
}

/// 一次缓存读取的分类结果
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<T> {
    /// 键不存在
    Miss,
    /// 命中空值标记
    NullMarker,
    /// 命中有效值
    Fresh(T),
    /// 命中逻辑过期的值
    Stale(T),
}

impl<T> CacheLookup<T> {
    pub fn label(&self) -> &'static str {
        match self {
            CacheLookup::Miss => "miss",
            CacheLookup::NullMarker => "null",
            CacheLookup::Fresh(_) => "hit",
            CacheLookup::Stale(_) => "stale",
        }
    }
}
