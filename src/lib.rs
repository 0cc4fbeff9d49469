//! oxflash - 缓存一致性与秒杀并发控制库
//!
//! 提供带防穿透、防击穿保护的读穿透缓存客户端、分布式锁、
//! 全局唯一ID生成器，以及基于原子脚本准入和单消费者落库的秒杀流水线。

#![doc(html_root_url = "https://docs.rs/oxflash/0.1.0")]

pub use serde;
pub use serde::{Deserialize, Serialize};
pub use serde_json;
pub use tokio;

pub mod app;
pub mod backend;
pub mod catalog;
pub mod cli;
pub mod client;
pub mod config;
pub mod database;
pub mod error;
pub mod id;
pub mod lock;
pub mod metrics;
pub mod seckill;
pub mod serialization;
pub mod telemetry;

// Re-export commonly used items
pub use app::App;
pub use backend::{MemoryStore, RedisStore, RemoteStore};
pub use client::CacheClient;
pub use config::Config;
pub use error::{FlashError, Result};
pub use lock::{DistributedLock, LockToken};
pub use seckill::{SeckillOutcome, SeckillPipeline, UserContext};

/// oxflash 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
