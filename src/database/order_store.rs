//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了订单落库接口及其关系型存储实现。

use super::unit_of_work::UnitOfWork;
use crate::error::Result;
use crate::seckill::{CommitOutcome, VoucherOrder};
use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use tracing::{info, instrument, warn};

/// 订单落库特征
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// 在单个事务中完成：查重、条件扣减库存、插入订单
    async fn create_voucher_order(&self, order: &VoucherOrder) -> Result<CommitOutcome>;
}

/// 基于 sea-orm 的订单落库实现
#[derive(Clone)]
pub struct SqlOrderStore {
    db: DatabaseConnection,
}

impl SqlOrderStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OrderStore for SqlOrderStore {
    #[instrument(skip(self, order), level = "debug", fields(order_id = order.id, user_id = order.user_id, voucher_id = order.voucher_id))]
    async fn create_voucher_order(&self, order: &VoucherOrder) -> Result<CommitOutcome> {
        let uow = UnitOfWork::begin(&self.db).await?;

        if uow.count_orders(order.user_id, order.voucher_id).await? > 0 {
            uow.rollback().await?;
            info!(
                "User {} already ordered voucher {}",
                order.user_id, order.voucher_id
            );
            return Ok(CommitOutcome::Duplicate);
        }

        if uow.decrement_stock(order.voucher_id).await? == 0 {
            uow.rollback().await?;
            warn!("Voucher {} has no persisted stock left", order.voucher_id);
            return Ok(CommitOutcome::OutOfStock);
        }

        let inserted = match uow.insert_order(order).await {
            Ok(inserted) => inserted,
            Err(e) => {
                uow.rollback().await?;
                return Err(e);
            }
        };
        if !inserted {
            uow.rollback().await?;
            info!(
                "Unique index rejected order {} for user {}",
                order.id, order.user_id
            );
            return Ok(CommitOutcome::Duplicate);
        }

        uow.commit().await?;
        Ok(CommitOutcome::Committed)
    }
}
