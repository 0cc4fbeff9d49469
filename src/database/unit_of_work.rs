//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了显式的数据库工作单元。
//!
//! 工作单元持有一个事务：`commit` 提交，显式 `rollback` 或直接丢弃则回滚。

use super::schema::{ident, ORDER_TABLE, ORDER_UNIQUE_INDEX, VOUCHER_TABLE};
use crate::error::{FlashError, Result};
use crate::seckill::VoucherOrder;
use sea_orm::sea_query::{Expr, Query};
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, SqlErr, TransactionTrait,
};
use tracing::debug;

pub struct UnitOfWork {
    txn: DatabaseTransaction,
}

impl UnitOfWork {
    pub async fn begin(db: &DatabaseConnection) -> Result<Self> {
        Ok(Self {
            txn: db.begin().await?,
        })
    }

    /// 统计 (user_id, voucher_id) 已有的订单数
    pub async fn count_orders(&self, user_id: i64, voucher_id: i64) -> Result<i64> {
        let stmt = Query::select()
            .expr(Expr::col(ident("id")).count())
            .from(ident(ORDER_TABLE))
            .and_where(Expr::col(ident("user_id")).eq(user_id))
            .and_where(Expr::col(ident("voucher_id")).eq(voucher_id))
            .to_owned();
        let backend = self.txn.get_database_backend();
        let count = match self.txn.query_one(backend.build(&stmt)).await? {
            Some(row) => row.try_get_by_index::<i64>(0)?,
            None => 0,
        };
        Ok(count)
    }

    /// 条件扣减库存：`stock = stock - 1 where voucher_id = ? and stock > 0`
    ///
    /// 返回受影响行数
    pub async fn decrement_stock(&self, voucher_id: i64) -> Result<u64> {
        let stmt = Query::update()
            .table(ident(VOUCHER_TABLE))
            .value(ident("stock"), Expr::col(ident("stock")).sub(1))
            .and_where(Expr::col(ident("voucher_id")).eq(voucher_id))
            .and_where(Expr::col(ident("stock")).gt(0))
            .to_owned();
        let backend = self.txn.get_database_backend();
        let result = self.txn.execute(backend.build(&stmt)).await?;
        debug!(
            "Stock decrement for voucher {} affected {} rows",
            voucher_id,
            result.rows_affected()
        );
        Ok(result.rows_affected())
    }

    /// 插入订单，违反 (user_id, voucher_id) 唯一索引时返回 false
    ///
    /// 其余唯一约束冲突（如订单号主键重复）属于订单号生成故障，作为错误返回
    pub async fn insert_order(&self, order: &VoucherOrder) -> Result<bool> {
        let mut stmt = Query::insert();
        stmt.into_table(ident(ORDER_TABLE)).columns([
            ident("id"),
            ident("user_id"),
            ident("voucher_id"),
            ident("create_time"),
        ]);
        stmt.values([
            order.id.into(),
            order.user_id.into(),
            order.voucher_id.into(),
            order.create_time.into(),
        ])
        .map_err(|e| FlashError::Database(e.to_string()))?;
        let backend = self.txn.get_database_backend();
        match self.txn.execute(backend.build(&stmt)).await {
            Ok(_) => Ok(true),
            Err(e) => match e.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(msg)) if names_order_index(&msg) => Ok(false),
                Some(SqlErr::UniqueConstraintViolation(msg)) => Err(FlashError::Database(format!(
                    "Order {} violates a unique key: {}",
                    order.id, msg
                ))),
                _ => Err(e.into()),
            },
        }
    }

    pub async fn commit(self) -> Result<()> {
        self.txn.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        self.txn.rollback().await?;
        Ok(())
    }
}

/// 判断唯一约束冲突信息是否指向用户-代金券唯一索引
///
/// MySQL 与 PostgreSQL 报出索引名，SQLite 只报出列名
fn names_order_index(message: &str) -> bool {
    message.contains(ORDER_UNIQUE_INDEX) || message.contains("user_id")
}
