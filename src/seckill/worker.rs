//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了订单队列的单消费者后台任务。

use super::model::{CommitOutcome, OrderTask};
use crate::config::RetryPolicy;
use crate::database::OrderStore;
use crate::error::{FlashError, Result};
use crate::lock::DistributedLock;
use crate::metrics::GLOBAL_METRICS;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// 订单落库后台任务
///
/// 逐个取出任务，按用户加锁后落库。单个任务的任何失败都只记录日志并丢弃该任务，
/// 循环本身只在队列关闭或被取消时退出
pub struct OrderWorker {
    receiver: mpsc::Receiver<OrderTask>,
    order_store: Arc<dyn OrderStore>,
    lock: DistributedLock,
    lock_ttl: Duration,
    lock_retry: RetryPolicy,
    cancel: CancellationToken,
}

impl OrderWorker {
    pub fn new(
        receiver: mpsc::Receiver<OrderTask>,
        order_store: Arc<dyn OrderStore>,
        lock: DistributedLock,
        lock_ttl: Duration,
        lock_retry: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            receiver,
            order_store,
            lock,
            lock_ttl,
            lock_retry,
            cancel,
        }
    }

    /// 消费循环
    pub async fn run(mut self) {
        info!("Order worker started");
        loop {
            let task = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    warn!("Order worker cancelled with {} tasks queued", self.receiver.len());
                    break;
                }
                task = self.receiver.recv() => match task {
                    Some(task) => task,
                    None => break,
                },
            };
            self.process(task).await;
        }
        info!("Order worker stopped");
    }

    async fn process(&self, task: OrderTask) {
        let waited = task.enqueue_time.elapsed();
        match AssertUnwindSafe(self.handle(&task)).catch_unwind().await {
            Ok(Ok(outcome)) => {
                let label = match outcome {
                    CommitOutcome::Committed => "committed",
                    CommitOutcome::Duplicate => "duplicate",
                    CommitOutcome::OutOfStock => "out_of_stock",
                };
                GLOBAL_METRICS.record("worker", "commit", label);
                GLOBAL_METRICS.record_duration("worker", "queue_wait", waited);
                debug!(
                    "Order {} for user {} finished as {}",
                    task.order_id, task.user_id, label
                );
            }
            Ok(Err(e)) => {
                GLOBAL_METRICS.record("worker", "commit", "dropped");
                error!(
                    "Dropping order {} (user {}, voucher {}): {}",
                    task.order_id, task.user_id, task.voucher_id, e
                );
            }
            Err(_) => {
                GLOBAL_METRICS.record("worker", "commit", "panicked");
                error!(
                    "Dropping order {} (user {}, voucher {}): handler panicked",
                    task.order_id, task.user_id, task.voucher_id
                );
            }
        }
    }

    /// 在用户级锁内落库一个订单，锁在所有退出路径上释放
    #[instrument(skip(self, task), level = "debug", fields(order_id = task.order_id, user_id = task.user_id))]
    pub async fn handle(&self, task: &OrderTask) -> Result<CommitOutcome> {
        let lock_name = format!("order:{}", task.user_id);
        let token = self
            .lock
            .lock_with_retry(&lock_name, self.lock_ttl, &self.lock_retry)
            .await?;

        let order = task.to_order();
        let result = AssertUnwindSafe(self.order_store.create_voucher_order(&order))
            .catch_unwind()
            .await;

        if let Err(e) = self.lock.unlock(&token).await {
            warn!("Failed to release {}: {}", token.lock_key, e);
        }

        match result {
            Ok(outcome) => outcome,
            Err(_) => Err(FlashError::Database(format!(
                "order store panicked while persisting order {}",
                order.id
            ))),
        }
    }
}
