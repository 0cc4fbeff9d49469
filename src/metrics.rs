//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存与秒杀流程的指标收集功能。

use dashmap::DashMap;
use lazy_static::lazy_static;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// 指标收集器
///
/// 计数器键格式为 `component:op:result`，耗时键格式为 `component:op`
#[derive(Debug, Default)]
pub struct Metrics {
    /// 操作计数
    pub requests_total: DashMap<String, AtomicU64>,
    /// 操作耗时累计（微秒）与次数
    pub operation_duration: DashMap<String, (u64, u64)>,
}

lazy_static! {
    /// 全局指标实例
    pub static ref GLOBAL_METRICS: Metrics = Metrics::default();
}

impl Metrics {
    /// 记录一次操作
    ///
    /// # 参数
    ///
    /// * `component` - 组件（cache/lock/seckill/worker/id）
    /// * `op` - 操作类型
    /// * `result` - 操作结果（hit/miss/ok/...）
    pub fn record(&self, component: &str, op: &str, result: &str) {
        let key = format!("{}:{}:{}", component, op, result);
        if let Some(counter) = self.requests_total.get(&key) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.requests_total
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// 记录操作耗时
    pub fn record_duration(&self, component: &str, op: &str, elapsed: Duration) {
        let key = format!("{}:{}", component, op);
        let mut entry = self.operation_duration.entry(key).or_insert((0, 0));
        entry.0 += elapsed.as_micros() as u64;
        entry.1 += 1;
    }

    /// 读取计数器当前值
    pub fn count(&self, component: &str, op: &str, result: &str) -> u64 {
        let key = format!("{}:{}:{}", component, op, result);
        self.requests_total
            .get(&key)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// 清空所有指标
    pub fn reset(&self) {
        self.requests_total.clear();
        self.operation_duration.clear();
    }
}

/// 获取指标字符串
///
/// 以文本行格式输出所有指标，按键排序
pub fn get_metrics_string() -> String {
    let metrics = &GLOBAL_METRICS;
    let mut lines: Vec<String> = metrics
        .requests_total
        .iter()
        .map(|entry| {
            format!(
                "oxflash_requests_total{{labels=\"{}\"}} {}",
                entry.key(),
                entry.value().load(Ordering::Relaxed)
            )
        })
        .collect();

    lines.extend(metrics.operation_duration.iter().map(|entry| {
        let (total_us, count) = *entry.value();
        let avg_ms = if count > 0 {
            total_us as f64 / count as f64 / 1000.0
        } else {
            0.0
        };
        format!(
            "oxflash_operation_duration_ms_avg{{op=\"{}\"}} {:.3}",
            entry.key(),
            avg_ms
        )
    }));

    lines.sort();
    let mut output = lines.join("\n");
    output.push('\n');
    output
}
