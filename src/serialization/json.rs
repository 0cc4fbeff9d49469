//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了JSON序列化器的实现。

use super::Serializer;
use crate::error::{FlashError, Result};
use serde::{de::DeserializeOwned, Serialize};

/// JSON序列化器
///
/// 基于serde_json，输出紧凑格式
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    pub fn new() -> Self {
        Self
    }
}

impl Serializer for JsonSerializer {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<String> {
        let text =
            serde_json::to_string(value).map_err(|e| FlashError::Serialization(e.to_string()))?;
        if text.is_empty() {
            return Err(FlashError::Serialization(
                "serialized payload must not be empty".to_string(),
            ));
        }
        Ok(text)
    }

    fn deserialize<T: DeserializeOwned>(&self, data: &str) -> Result<T> {
        serde_json::from_str(data).map_err(|e| FlashError::Serialization(e.to_string()))
    }
}
