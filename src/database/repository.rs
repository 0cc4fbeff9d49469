//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了商铺与代金券的数据访问。

use super::schema::{ident, ORDER_TABLE, SHOP_TABLE, VOUCHER_TABLE};
use crate::catalog::Shop;
use crate::error::{FlashError, Result};
use crate::seckill::{SeckillVoucher, VoucherOrder};
use sea_orm::sea_query::{Expr, Query};
use sea_orm::{ConnectionTrait, DatabaseConnection, QueryResult};
use tracing::instrument;

const SHOP_COLUMNS: [&str; 8] = [
    "id",
    "name",
    "type_id",
    "area",
    "address",
    "avg_price",
    "score",
    "open_hours",
];

fn shop_from_row(row: &QueryResult) -> Result<Shop> {
    Ok(Shop {
        id: row.try_get("", "id")?,
        name: row.try_get("", "name")?,
        type_id: row.try_get("", "type_id")?,
        area: row.try_get("", "area")?,
        address: row.try_get("", "address")?,
        avg_price: row.try_get("", "avg_price")?,
        score: row.try_get("", "score")?,
        open_hours: row.try_get("", "open_hours")?,
    })
}

fn build_error(e: impl std::fmt::Display) -> FlashError {
    FlashError::Database(e.to_string())
}

/// 商铺仓储
#[derive(Clone)]
pub struct ShopRepository {
    db: DatabaseConnection,
}

impl ShopRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn find(&self, id: i64) -> Result<Option<Shop>> {
        let stmt = Query::select()
            .columns(SHOP_COLUMNS.map(ident))
            .from(ident(SHOP_TABLE))
            .and_where(Expr::col(ident("id")).eq(id))
            .to_owned();
        let backend = self.db.get_database_backend();
        match self.db.query_one(backend.build(&stmt)).await? {
            Some(row) => Ok(Some(shop_from_row(&row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, shop), level = "debug", fields(id = shop.id))]
    pub async fn insert(&self, shop: &Shop) -> Result<()> {
        let mut stmt = Query::insert();
        stmt.into_table(ident(SHOP_TABLE))
            .columns(SHOP_COLUMNS.map(ident));
        stmt.values([
            shop.id.into(),
            shop.name.clone().into(),
            shop.type_id.into(),
            shop.area.clone().into(),
            shop.address.clone().into(),
            shop.avg_price.into(),
            shop.score.into(),
            shop.open_hours.clone().into(),
        ])
        .map_err(build_error)?;
        let backend = self.db.get_database_backend();
        self.db.execute(backend.build(&stmt)).await?;
        Ok(())
    }

    /// 按主键更新，返回受影响行数
    #[instrument(skip(self, shop), level = "debug", fields(id = shop.id))]
    pub async fn update(&self, shop: &Shop) -> Result<u64> {
        let stmt = Query::update()
            .table(ident(SHOP_TABLE))
            .values([
                (ident("name"), shop.name.clone().into()),
                (ident("type_id"), shop.type_id.into()),
                (ident("area"), shop.area.clone().into()),
                (ident("address"), shop.address.clone().into()),
                (ident("avg_price"), shop.avg_price.into()),
                (ident("score"), shop.score.into()),
                (ident("open_hours"), shop.open_hours.clone().into()),
            ])
            .and_where(Expr::col(ident("id")).eq(shop.id))
            .to_owned();
        let backend = self.db.get_database_backend();
        Ok(self.db.execute(backend.build(&stmt)).await?.rows_affected())
    }
}

/// 代金券与订单仓储
#[derive(Clone)]
pub struct VoucherRepository {
    db: DatabaseConnection,
}

impl VoucherRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, voucher), level = "debug", fields(voucher_id = voucher.voucher_id))]
    pub async fn insert(&self, voucher: &SeckillVoucher) -> Result<()> {
        let mut stmt = Query::insert();
        stmt.into_table(ident(VOUCHER_TABLE)).columns([
            ident("voucher_id"),
            ident("stock"),
            ident("begin_time"),
            ident("end_time"),
        ]);
        stmt.values([
            voucher.voucher_id.into(),
            voucher.stock.into(),
            voucher.begin_time.into(),
            voucher.end_time.into(),
        ])
        .map_err(build_error)?;
        let backend = self.db.get_database_backend();
        self.db.execute(backend.build(&stmt)).await?;
        Ok(())
    }

    /// 读取持久化库存
    pub async fn stock(&self, voucher_id: i64) -> Result<Option<i32>> {
        let stmt = Query::select()
            .column(ident("stock"))
            .from(ident(VOUCHER_TABLE))
            .and_where(Expr::col(ident("voucher_id")).eq(voucher_id))
            .to_owned();
        let backend = self.db.get_database_backend();
        match self.db.query_one(backend.build(&stmt)).await? {
            Some(row) => Ok(Some(row.try_get("", "stock")?)),
            None => Ok(None),
        }
    }

    /// 某代金券下的全部订单，按订单号升序
    pub async fn orders(&self, voucher_id: i64) -> Result<Vec<VoucherOrder>> {
        let stmt = Query::select()
            .columns(["id", "user_id", "voucher_id", "create_time"].map(ident))
            .from(ident(ORDER_TABLE))
            .and_where(Expr::col(ident("voucher_id")).eq(voucher_id))
            .order_by(ident("id"), sea_orm::sea_query::Order::Asc)
            .to_owned();
        let backend = self.db.get_database_backend();
        self.db
            .query_all(backend.build(&stmt))
            .await?
            .iter()
            .map(|row| -> Result<VoucherOrder> {
                Ok(VoucherOrder {
                    id: row.try_get("", "id")?,
                    user_id: row.try_get("", "user_id")?,
                    voucher_id: row.try_get("", "voucher_id")?,
                    create_time: row.try_get("", "create_time")?,
                })
            })
            .collect()
    }
}
