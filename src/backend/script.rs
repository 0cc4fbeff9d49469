//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了服务端原子脚本。
//!
//! 每个脚本同时携带 Lua 源码（由 Redis 执行）与等价的本地实现
//! （由 [`MemoryStore`](super::MemoryStore) 在存储锁内执行），两者的返回码必须一致。

use crate::error::{FlashError, Result};
use std::fmt;

/// 本地脚本实现：`(上下文, KEYS, ARGV) -> 整数结果`
pub type NativeScript = fn(&mut dyn ScriptContext, &[String], &[String]) -> Result<i64>;

/// 本地脚本可见的存储操作
///
/// 调用方保证整个脚本执行期间不会有其它操作交错
pub trait ScriptContext {
    fn get(&mut self, key: &str) -> Option<String>;
    fn del(&mut self, key: &str) -> bool;
    fn incr_by(&mut self, key: &str, delta: i64) -> Result<i64>;
    fn set_add(&mut self, key: &str, member: &str) -> bool;
    fn set_is_member(&mut self, key: &str, member: &str) -> bool;
}

/// 服务端脚本
#[derive(Clone, Copy)]
pub struct StoreScript {
    name: &'static str,
    source: &'static str,
    native: NativeScript,
}

impl StoreScript {
    pub const fn new(name: &'static str, source: &'static str, native: NativeScript) -> Self {
        Self {
            name,
            source,
            native,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn source(&self) -> &'static str {
        self.source
    }

    /// 在给定上下文中执行本地实现
    pub fn run_native(
        &self,
        ctx: &mut dyn ScriptContext,
        keys: &[String],
        args: &[String],
    ) -> Result<i64> {
        (self.native)(ctx, keys, args)
    }
}

impl fmt::Debug for StoreScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreScript").field("name", &self.name).finish()
    }
}

fn arg<'a>(values: &'a [String], index: usize, script: &str) -> Result<&'a str> {
    values.get(index).map(String::as_str).ok_or_else(|| {
        FlashError::Script(format!("{} script expects argument #{}", script, index + 1))
    })
}

/// 秒杀准入脚本
///
/// KEYS[1] 库存计数，KEYS[2] 已下单用户集合，ARGV[1] 用户ID。
/// 返回 0 准入，1 库存不足（含计数不存在），2 重复下单
pub const SECKILL_SCRIPT: StoreScript = StoreScript::new(
    "seckill",
    r#"
    local stock = tonumber(redis.call('get', KEYS[1]))
    if (not stock) or stock <= 0 then
        return 1
    end
    if redis.call('sismember', KEYS[2], ARGV[1]) == 1 then
        return 2
    end
    redis.call('incrby', KEYS[1], -1)
    redis.call('sadd', KEYS[2], ARGV[1])
    return 0
    "#,
    seckill_native,
);

fn seckill_native(ctx: &mut dyn ScriptContext, keys: &[String], args: &[String]) -> Result<i64> {
    let stock_key = arg(keys, 0, "seckill")?;
    let order_key = arg(keys, 1, "seckill")?;
    let user_id = arg(args, 0, "seckill")?;

    let stock = ctx
        .get(stock_key)
        .and_then(|raw| raw.trim().parse::<i64>().ok());
    match stock {
        Some(stock) if stock > 0 => {}
        _ => return Ok(1),
    }
    if ctx.set_is_member(order_key, user_id) {
        return Ok(2);
    }
    ctx.incr_by(stock_key, -1)?;
    ctx.set_add(order_key, user_id);
    Ok(0)
}

/// 释放锁脚本
///
/// KEYS[1] 锁键，ARGV[1] 持有者令牌。值匹配时删除并返回 1，否则返回 0
pub const UNLOCK_SCRIPT: StoreScript = StoreScript::new(
    "unlock",
    r#"
    if redis.call('get', KEYS[1]) == ARGV[1] then
        return redis.call('del', KEYS[1])
    end
    return 0
    "#,
    unlock_native,
);

fn unlock_native(ctx: &mut dyn ScriptContext, keys: &[String], args: &[String]) -> Result<i64> {
    let lock_key = arg(keys, 0, "unlock")?;
    let expected = arg(args, 0, "unlock")?;

    if ctx.get(lock_key).as_deref() == Some(expected) {
        Ok(i64::from(ctx.del(lock_key)))
    } else {
        Ok(0)
    }
}
