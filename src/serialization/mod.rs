//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存负载的序列化机制。
//!
//! 远程存储以字符串保存负载，空字符串保留给"不存在"标记，
//! 因此序列化器产出的文本永远不能为空。

pub mod json;

use crate::error::Result;
use serde::{de::DeserializeOwned, Serialize};

pub use json::JsonSerializer;

/// 序列化器特征
pub trait Serializer: Send + Sync {
    /// 序列化值为文本
    fn serialize<T: Serialize>(&self, value: &T) -> Result<String>;

    /// 从文本反序列化值
    fn deserialize<T: DeserializeOwned>(&self, data: &str) -> Result<T>;
}
