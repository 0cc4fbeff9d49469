//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了秒杀流程中的实体与结果类型。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// 调用方身份，显式沿调用链传递
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserContext {
    pub user_id: i64,
}

impl UserContext {
    pub fn new(user_id: i64) -> Self {
        Self { user_id }
    }
}

/// 秒杀代金券
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeckillVoucher {
    pub voucher_id: i64,
    pub stock: i32,
    pub begin_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// 已持久化的代金券订单
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoucherOrder {
    pub id: i64,
    pub user_id: i64,
    pub voucher_id: i64,
    pub create_time: DateTime<Utc>,
}

/// 已准入、待持久化的订单任务
#[derive(Debug, Clone)]
pub struct OrderTask {
    pub order_id: i64,
    pub user_id: i64,
    pub voucher_id: i64,
    pub enqueue_time: Instant,
}

impl OrderTask {
    pub fn to_order(&self) -> VoucherOrder {
        VoucherOrder {
            id: self.order_id,
            user_id: self.user_id,
            voucher_id: self.voucher_id,
            create_time: Utc::now(),
        }
    }
}

/// 拒绝原因，数值与准入脚本返回码一致
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    InsufficientStock = 1,
    DuplicateOrder = 2,
}

impl RejectReason {
    pub fn code(self) -> i64 {
        self as i64
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::InsufficientStock => write!(f, "库存不足"),
            RejectReason::DuplicateOrder => write!(f, "不能重复下单"),
        }
    }
}

/// 准入结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeckillOutcome {
    Admitted { order_id: i64 },
    Rejected(RejectReason),
}

impl SeckillOutcome {
    /// 准入脚本返回码：0 准入，1 库存不足，2 重复下单
    pub fn code(&self) -> i64 {
        match self {
            SeckillOutcome::Admitted { .. } => 0,
            SeckillOutcome::Rejected(reason) => reason.code(),
        }
    }

    pub fn is_admitted(&self) -> bool {
        matches!(self, SeckillOutcome::Admitted { .. })
    }

    pub fn order_id(&self) -> Option<i64> {
        match self {
            SeckillOutcome::Admitted { order_id } => Some(*order_id),
            SeckillOutcome::Rejected(_) => None,
        }
    }
}

/// 订单落库结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// 该用户已有此代金券的订单
    Duplicate,
    /// 持久化库存已耗尽
    OutOfStock,
}
