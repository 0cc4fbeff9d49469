//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了商铺目录的读写入口。
//!
//! 读取按配置的策略经过缓存客户端；更新先写库再删缓存；
//! 逻辑过期策略从不为未命中回源，所以热点数据需要先预热。

use crate::client::CacheClient;
use crate::config::{CacheConfig, CacheStrategy};
use crate::database::ShopRepository;
use crate::error::{FlashError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument};

/// 商铺
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shop {
    pub id: i64,
    pub name: String,
    pub type_id: i64,
    pub area: String,
    pub address: String,
    /// 人均价格（分）
    pub avg_price: i64,
    /// 评分，1~5 分乘以 10
    pub score: i32,
    pub open_hours: String,
}

/// 商铺目录
#[derive(Clone)]
pub struct ShopCatalog {
    cache: CacheClient,
    shops: ShopRepository,
    config: CacheConfig,
}

impl ShopCatalog {
    pub fn new(cache: CacheClient, shops: ShopRepository, config: CacheConfig) -> Self {
        Self {
            cache,
            shops,
            config,
        }
    }

    pub fn cache_key(&self, id: i64) -> String {
        format!("{}{}", self.config.shop_key_prefix, id)
    }

    pub fn strategy(&self) -> CacheStrategy {
        self.config.strategy
    }

    /// 按配置的策略读取商铺
    pub async fn read_catalog_entry(&self, id: i64) -> Result<Option<Shop>> {
        self.read_with(self.config.strategy, id).await
    }

    /// 按指定策略读取商铺
    #[instrument(skip(self), level = "debug")]
    pub async fn read_with(&self, strategy: CacheStrategy, id: i64) -> Result<Option<Shop>> {
        let prefix = self.config.shop_key_prefix.as_str();
        let ttl = self.config.shop_ttl();
        let shops = self.shops.clone();
        let fallback = move |id: i64| async move { shops.find(id).await };

        match strategy {
            CacheStrategy::PassThrough => {
                self.cache
                    .query_with_pass_through(prefix, id, fallback, ttl)
                    .await
            }
            CacheStrategy::Mutex => {
                self.cache
                    .query_with_mutex(prefix, id, fallback, ttl, &self.config.mutex_retry)
                    .await
            }
            CacheStrategy::LogicalExpire => {
                self.cache
                    .query_with_logical_expire(prefix, id, fallback, ttl)
                    .await
            }
        }
    }

    /// 更新商铺：先写关系型存储，再删除缓存
    ///
    /// 返回是否有行被更新
    #[instrument(skip(self, shop), level = "info", fields(id = shop.id))]
    pub async fn update_shop(&self, shop: &Shop) -> Result<bool> {
        if shop.id <= 0 {
            return Err(FlashError::InvalidInput(
                "shop id must be positive".to_string(),
            ));
        }
        let updated = self.shops.update(shop).await? > 0;
        self.cache.invalidate(&self.cache_key(shop.id)).await?;
        Ok(updated)
    }

    /// 预热：把商铺以逻辑过期方式写入缓存，返回写入数量
    #[instrument(skip(self, ids), level = "info", fields(count = ids.len()))]
    pub async fn warmup(&self, ids: &[i64], expire: Duration) -> Result<usize> {
        let mut warmed = 0;
        for &id in ids {
            match self.shops.find(id).await? {
                Some(shop) => {
                    self.cache
                        .write_with_logical_expiry(&self.cache_key(id), &shop, expire)
                        .await?;
                    warmed += 1;
                }
                None => info!("Shop {} not found, skipped warmup", id),
            }
        }
        info!("Warmed {} of {} shops", warmed, ids.len());
        Ok(warmed)
    }
}
