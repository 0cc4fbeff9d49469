//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块负责按配置显式组装全部组件，并按序关闭。

use crate::backend::{MemoryStore, RedisStore, RemoteStore};
use crate::catalog::ShopCatalog;
use crate::client::CacheClient;
use crate::config::Config;
use crate::database::{self, ShopRepository, SqlOrderStore, VoucherRepository};
use crate::error::{FlashError, Result};
use crate::id::IdGenerator;
use crate::lock::DistributedLock;
use crate::seckill::SeckillPipeline;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tracing::info;

/// 已组装的应用
pub struct App {
    pub config: Config,
    pub store: Arc<dyn RemoteStore>,
    pub db: DatabaseConnection,
    pub cache: CacheClient,
    pub lock: DistributedLock,
    pub ids: IdGenerator,
    pub catalog: ShopCatalog,
    pub vouchers: VoucherRepository,
    pub pipeline: SeckillPipeline,
}

impl App {
    /// 连接 Redis 与关系型存储并启动后台任务
    pub async fn connect(config: Config) -> Result<Self> {
        let store: Arc<dyn RemoteStore> = Arc::new(RedisStore::connect(&config.redis).await?);
        store.ping().await?;
        Self::with_store(config, store).await
    }

    /// 使用进程内存储组装，适用于单进程部署与测试
    pub async fn in_memory(config: Config) -> Result<Self> {
        Self::with_store(config, Arc::new(MemoryStore::new())).await
    }

    /// 使用给定的远程存储组装
    ///
    /// 代码构造的配置与文件加载的配置走同一套取值校验
    pub async fn with_store(config: Config, store: Arc<dyn RemoteStore>) -> Result<Self> {
        config.validate().map_err(FlashError::Config)?;
        let db = database::connect(&config.database).await?;

        let cache = CacheClient::new(store.clone(), &config.cache);
        let lock = DistributedLock::new(store.clone(), config.cache.lock_prefix.clone());
        let ids = IdGenerator::new(store.clone(), &config.id);
        let catalog = ShopCatalog::new(
            cache.clone(),
            ShopRepository::new(db.clone()),
            config.cache.clone(),
        );
        let vouchers = VoucherRepository::new(db.clone());
        let pipeline = SeckillPipeline::start(
            store.clone(),
            ids.clone(),
            lock.clone(),
            Arc::new(SqlOrderStore::new(db.clone())),
            config.seckill.clone(),
        );

        info!("Application assembled");
        Ok(Self {
            config,
            store,
            db,
            cache,
            lock,
            ids,
            catalog,
            vouchers,
            pipeline,
        })
    }

    /// 依次停止准入、排空订单队列、等待缓存重建，最后关闭数据库连接
    pub async fn shutdown(self) -> Result<()> {
        self.pipeline.shutdown().await;
        self.cache.shutdown().await;
        self.db.close().await?;
        info!("Application stopped");
        Ok(())
    }
}
