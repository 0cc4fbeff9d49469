//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块实现了进程内的远程存储。
//!
//! 语义与 Redis 对齐：惰性过期、类型检查、脚本在单把锁内原子执行。
//! 适用于测试与单实例部署，不跨进程共享。

use super::script::{ScriptContext, StoreScript};
use super::RemoteStore;
use crate::error::{FlashError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    Set(HashSet<String>),
    ZSet(HashMap<String, f64>),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Hash(_) => "hash",
            Value::Set(_) => "set",
            Value::ZSet(_) => "zset",
        }
    }
}

#[derive(Debug)]
struct Slot {
    value: Value,
    expires_at: Option<Instant>,
}

impl Slot {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

fn wrong_type(key: &str, found: &Value, expected: &str) -> FlashError {
    FlashError::Store(format!(
        "WRONGTYPE key '{}' holds a {} value, expected {}",
        key,
        found.kind(),
        expected
    ))
}

#[derive(Debug, Default)]
struct MemoryState {
    slots: HashMap<String, Slot>,
}

impl MemoryState {
    /// 取出未过期的槽位，过期的顺手清除
    fn live(&mut self, key: &str) -> Option<&mut Slot> {
        let now = Instant::now();
        if self.slots.get(key).is_some_and(|slot| slot.is_expired(now)) {
            self.slots.remove(key);
        }
        self.slots.get_mut(key)
    }

    fn string(&mut self, key: &str) -> Result<Option<String>> {
        match self.live(key) {
            Some(Slot {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(slot) => Err(wrong_type(key, &slot.value, "string")),
            None => Ok(None),
        }
    }

    fn put_string(&mut self, key: &str, value: &str, ttl: Option<Duration>) {
        let mut slot = Slot::new(Value::Str(value.to_string()));
        slot.expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.slots.insert(key.to_string(), slot);
    }

    fn add_to_counter(&mut self, key: &str, delta: i64) -> Result<i64> {
        if self.live(key).is_none() {
            self.slots
                .insert(key.to_string(), Slot::new(Value::Str("0".to_string())));
        }
        let slot = self
            .slots
            .get_mut(key)
            .ok_or_else(|| FlashError::Store(format!("failed to create key '{}'", key)))?;
        let current = match &slot.value {
            Value::Str(s) => s.parse::<i64>().map_err(|_| {
                FlashError::Store(format!("value at '{}' is not an integer", key))
            })?,
            other => return Err(wrong_type(key, other, "string")),
        };
        let next = current
            .checked_add(delta)
            .ok_or_else(|| FlashError::Store(format!("increment at '{}' overflows", key)))?;
        // INCR 保留原有的过期时间
        slot.value = Value::Str(next.to_string());
        Ok(next)
    }

    fn hash_mut(&mut self, key: &str) -> Result<&mut HashMap<String, String>> {
        if self.live(key).is_none() {
            self.slots
                .insert(key.to_string(), Slot::new(Value::Hash(HashMap::new())));
        }
        match self.slots.get_mut(key).map(|slot| &mut slot.value) {
            Some(Value::Hash(map)) => Ok(map),
            Some(other) => Err(wrong_type(key, other, "hash")),
            None => Err(FlashError::Store(format!("failed to create key '{}'", key))),
        }
    }

    fn set_mut(&mut self, key: &str) -> Result<&mut HashSet<String>> {
        if self.live(key).is_none() {
            self.slots
                .insert(key.to_string(), Slot::new(Value::Set(HashSet::new())));
        }
        match self.slots.get_mut(key).map(|slot| &mut slot.value) {
            Some(Value::Set(set)) => Ok(set),
            Some(other) => Err(wrong_type(key, other, "set")),
            None => Err(FlashError::Store(format!("failed to create key '{}'", key))),
        }
    }

    fn zset_mut(&mut self, key: &str) -> Result<&mut HashMap<String, f64>> {
        if self.live(key).is_none() {
            self.slots
                .insert(key.to_string(), Slot::new(Value::ZSet(HashMap::new())));
        }
        match self.slots.get_mut(key).map(|slot| &mut slot.value) {
            Some(Value::ZSet(zset)) => Ok(zset),
            Some(other) => Err(wrong_type(key, other, "zset")),
            None => Err(FlashError::Store(format!("failed to create key '{}'", key))),
        }
    }

    fn zset(&mut self, key: &str) -> Result<Option<&HashMap<String, f64>>> {
        match self.live(key) {
            Some(Slot {
                value: Value::ZSet(zset),
                ..
            }) => Ok(Some(zset)),
            Some(slot) => Err(wrong_type(key, &slot.value, "zset")),
            None => Ok(None),
        }
    }
}

impl ScriptContext for MemoryState {
    fn get(&mut self, key: &str) -> Option<String> {
        match self.live(key) {
            Some(Slot {
                value: Value::Str(s),
                ..
            }) => Some(s.clone()),
            _ => None,
        }
    }

    fn del(&mut self, key: &str) -> bool {
        self.live(key).is_some() && self.slots.remove(key).is_some()
    }

    fn incr_by(&mut self, key: &str, delta: i64) -> Result<i64> {
        self.add_to_counter(key, delta)
    }

    fn set_add(&mut self, key: &str, member: &str) -> bool {
        self.set_mut(key)
            .map(|set| set.insert(member.to_string()))
            .unwrap_or(false)
    }

    fn set_is_member(&mut self, key: &str, member: &str) -> bool {
        match self.live(key) {
            Some(Slot {
                value: Value::Set(set),
                ..
            }) => set.contains(member),
            _ => false,
        }
    }
}

/// 进程内远程存储
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| FlashError::Store("memory store lock poisoned".to_string()))
    }

    /// 剩余生存时间，键不存在或无过期时间时返回 None
    pub fn time_to_live(&self, key: &str) -> Result<Option<Duration>> {
        let mut state = self.state()?;
        Ok(state
            .live(key)
            .and_then(|slot| slot.expires_at)
            .map(|at| at.saturating_duration_since(Instant::now())))
    }

    /// 集合成员数，键不存在时为 0
    pub fn set_len(&self, key: &str) -> Result<usize> {
        let mut state = self.state()?;
        match state.live(key) {
            Some(Slot {
                value: Value::Set(set),
                ..
            }) => Ok(set.len()),
            Some(slot) => Err(wrong_type(key, &slot.value, "set")),
            None => Ok(0),
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.state()?.string(key)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.state()?.put_string(key, value, ttl);
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut state = self.state()?;
        if state.live(key).is_some() {
            return Ok(false);
        }
        state.put_string(key, value, Some(ttl));
        Ok(true)
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        self.state()?.add_to_counter(key, 1)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(ScriptContext::del(&mut *self.state()?, key))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut state = self.state()?;
        match state.live(key) {
            Some(slot) => {
                slot.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn hash_set_all(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        let mut state = self.state()?;
        let map = state.hash_mut(key)?;
        for (field, value) in fields {
            map.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut state = self.state()?;
        match state.live(key) {
            Some(Slot {
                value: Value::Hash(map),
                ..
            }) => Ok(map.clone()),
            Some(slot) => Err(wrong_type(key, &slot.value, "hash")),
            None => Ok(HashMap::new()),
        }
    }

    async fn zset_add(&self, key: &str, member: &str, score: f64) -> Result<bool> {
        let mut state = self.state()?;
        Ok(state
            .zset_mut(key)?
            .insert(member.to_string(), score)
            .is_none())
    }

    async fn zset_remove(&self, key: &str, member: &str) -> Result<bool> {
        let mut state = self.state()?;
        let removed = match state.live(key) {
            Some(Slot {
                value: Value::ZSet(zset),
                ..
            }) => zset.remove(member).is_some(),
            Some(slot) => return Err(wrong_type(key, &slot.value, "zset")),
            None => false,
        };
        // Redis 在集合变空时删除键
        if state.zset(key)?.is_some_and(|zset| zset.is_empty()) {
            state.slots.remove(key);
        }
        Ok(removed)
    }

    async fn zset_score(&self, key: &str, member: &str) -> Result<Option<f64>> {
        let mut state = self.state()?;
        Ok(state
            .zset(key)?
            .and_then(|zset| zset.get(member).copied()))
    }

    async fn zset_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let mut state = self.state()?;
        let Some(zset) = state.zset(key)? else {
            return Ok(Vec::new());
        };

        let mut members: Vec<(&String, f64)> = zset.iter().map(|(m, s)| (m, *s)).collect();
        members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));

        let len = members.len() as isize;
        let start = if start < 0 { (len + start).max(0) } else { start };
        let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
        if start > stop || start >= len {
            return Ok(Vec::new());
        }

        Ok(members[start as usize..=stop as usize]
            .iter()
            .map(|(member, _)| (*member).clone())
            .collect())
    }

    #[instrument(skip(self, script), level = "debug", fields(script = script.name()))]
    async fn eval(&self, script: &StoreScript, keys: &[String], args: &[String]) -> Result<i64> {
        let mut state = self.state()?;
        let result = script.run_native(&mut *state, keys, args)?;
        debug!("Script {} returned {}", script.name(), result);
        Ok(result)
    }

    async fn ping(&self) -> Result<()> {
        self.state().map(|_| ())
    }
}
