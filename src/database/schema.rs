//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了关系型存储的表结构。

use crate::error::Result;
use sea_orm::sea_query::{Alias, ColumnDef, Index, Table, TableCreateStatement};
use sea_orm::{ConnectionTrait, DatabaseConnection};
use tracing::info;

pub const SHOP_TABLE: &str = "tb_shop";
pub const VOUCHER_TABLE: &str = "tb_seckill_voucher";
pub const ORDER_TABLE: &str = "tb_voucher_order";

/// 同一用户同一代金券最多一笔订单
pub const ORDER_UNIQUE_INDEX: &str = "uk_voucher_order_user_voucher";

pub(crate) fn ident(name: &str) -> Alias {
    Alias::new(name)
}

fn shop_table() -> TableCreateStatement {
    Table::create()
        .table(ident(SHOP_TABLE))
        .if_not_exists()
        .col(ColumnDef::new(ident("id")).big_integer().not_null().primary_key())
        .col(ColumnDef::new(ident("name")).string_len(128).not_null())
        .col(ColumnDef::new(ident("type_id")).big_integer().not_null())
        .col(ColumnDef::new(ident("area")).string_len(128).not_null())
        .col(ColumnDef::new(ident("address")).string_len(255).not_null())
        .col(ColumnDef::new(ident("avg_price")).big_integer().not_null())
        .col(ColumnDef::new(ident("score")).integer().not_null())
        .col(ColumnDef::new(ident("open_hours")).string_len(64).not_null())
        .to_owned()
}

fn voucher_table() -> TableCreateStatement {
    Table::create()
        .table(ident(VOUCHER_TABLE))
        .if_not_exists()
        .col(
            ColumnDef::new(ident("voucher_id"))
                .big_integer()
                .not_null()
                .primary_key(),
        )
        .col(ColumnDef::new(ident("stock")).integer().not_null())
        .col(
            ColumnDef::new(ident("begin_time"))
                .timestamp_with_time_zone()
                .not_null(),
        )
        .col(
            ColumnDef::new(ident("end_time"))
                .timestamp_with_time_zone()
                .not_null(),
        )
        .to_owned()
}

fn order_table() -> TableCreateStatement {
    Table::create()
        .table(ident(ORDER_TABLE))
        .if_not_exists()
        .col(ColumnDef::new(ident("id")).big_integer().not_null().primary_key())
        .col(ColumnDef::new(ident("user_id")).big_integer().not_null())
        .col(ColumnDef::new(ident("voucher_id")).big_integer().not_null())
        .col(
            ColumnDef::new(ident("create_time"))
                .timestamp_with_time_zone()
                .not_null(),
        )
        .index(
            Index::create()
                .name(ORDER_UNIQUE_INDEX)
                .col(ident("user_id"))
                .col(ident("voucher_id"))
                .unique(),
        )
        .to_owned()
}

/// 创建全部表（已存在时跳过）
pub async fn ensure_schema(db: &DatabaseConnection) -> Result<()> {
    let backend = db.get_database_backend();
    for table in [shop_table(), voucher_table(), order_table()] {
        db.execute(backend.build(&table)).await?;
    }
    info!("Database schema ready");
    Ok(())
}
