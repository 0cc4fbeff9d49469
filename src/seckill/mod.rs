//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 秒杀准入流水线
//!
//! 请求先通过准入脚本在一次往返内完成库存与重复检查，准入后生成订单号并放入有界队列，
//! 由唯一的后台任务按用户加锁落库。准入与持久化解耦，调用方不等待落库。

pub mod model;
pub mod worker;

use crate::backend::{RemoteStore, SECKILL_SCRIPT};
use crate::config::SeckillConfig;
use crate::database::{OrderStore, VoucherRepository};
use crate::error::{FlashError, Result};
use crate::id::IdGenerator;
use crate::lock::DistributedLock;
use crate::metrics::GLOBAL_METRICS;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

pub use model::{
    CommitOutcome, OrderTask, RejectReason, SeckillOutcome, SeckillVoucher, UserContext,
    VoucherOrder,
};
pub use worker::OrderWorker;

/// 秒杀准入流水线
pub struct SeckillPipeline {
    store: Arc<dyn RemoteStore>,
    ids: IdGenerator,
    config: SeckillConfig,
    sender: RwLock<Option<mpsc::Sender<OrderTask>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl SeckillPipeline {
    /// 创建流水线并启动后台订单任务
    pub fn start(
        store: Arc<dyn RemoteStore>,
        ids: IdGenerator,
        lock: DistributedLock,
        order_store: Arc<dyn OrderStore>,
        config: SeckillConfig,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let cancel = CancellationToken::new();
        let worker = OrderWorker::new(
            receiver,
            order_store,
            lock,
            config.order_lock_ttl(),
            config.lock_retry.clone(),
            cancel.clone(),
        );
        let handle = tokio::spawn(worker.run());
        info!(
            "Seckill pipeline started with queue capacity {}",
            config.queue_capacity
        );

        Self {
            store,
            ids,
            config,
            sender: RwLock::new(Some(sender)),
            worker: Mutex::new(Some(handle)),
            cancel,
        }
    }

    /// 库存计数键，带集群哈希标签
    pub fn stock_key(&self, voucher_id: i64) -> String {
        format!("{}{{{}}}", self.config.stock_key_prefix, voucher_id)
    }

    /// 已下单用户集合键，与库存计数位于同一槽位
    pub fn order_key(&self, voucher_id: i64) -> String {
        format!("{}{{{}}}", self.config.order_key_prefix, voucher_id)
    }

    /// 写入远程库存计数
    pub async fn seed_stock(&self, voucher_id: i64, stock: i32) -> Result<()> {
        self.store
            .set(&self.stock_key(voucher_id), &stock.to_string(), None)
            .await
    }

    /// 发布秒杀代金券：先写入关系型存储，再写入远程库存计数
    #[instrument(skip(self, vouchers, voucher), level = "info", fields(voucher_id = voucher.voucher_id, stock = voucher.stock))]
    pub async fn publish_voucher(
        &self,
        vouchers: &VoucherRepository,
        voucher: &SeckillVoucher,
    ) -> Result<()> {
        vouchers.insert(voucher).await?;
        self.seed_stock(voucher.voucher_id, voucher.stock).await?;
        info!("Published voucher {}", voucher.voucher_id);
        Ok(())
    }

    /// 秒杀下单
    ///
    /// 返回准入结果；准入时订单已入队，但尚未落库
    #[instrument(skip(self, user), level = "debug", fields(user_id = user.user_id))]
    pub async fn acquire_seckill_order(
        &self,
        user: &UserContext,
        voucher_id: i64,
    ) -> Result<SeckillOutcome> {
        let started = Instant::now();
        let sender = self
            .sender
            .read()
            .await
            .clone()
            .ok_or_else(|| FlashError::QueueClosed("seckill pipeline is shut down".to_string()))?;

        let code = self
            .store
            .eval(
                &SECKILL_SCRIPT,
                &[self.stock_key(voucher_id), self.order_key(voucher_id)],
                &[user.user_id.to_string()],
            )
            .await?;

        let outcome = match code {
            0 => {
                let order_id = match self.ids.next_id(&self.config.id_prefix).await {
                    Ok(id) => id,
                    Err(e) => {
                        error!(
                            "User {} admitted for voucher {} but no order id was minted: {}",
                            user.user_id, voucher_id, e
                        );
                        return Err(e);
                    }
                };
                let task = OrderTask {
                    order_id,
                    user_id: user.user_id,
                    voucher_id,
                    enqueue_time: Instant::now(),
                };
                if sender.send(task).await.is_err() {
                    error!(
                        "Order queue closed before order {} could be queued",
                        order_id
                    );
                    return Err(FlashError::QueueClosed(format!(
                        "order {} was admitted but not queued",
                        order_id
                    )));
                }
                SeckillOutcome::Admitted { order_id }
            }
            1 => SeckillOutcome::Rejected(RejectReason::InsufficientStock),
            2 => SeckillOutcome::Rejected(RejectReason::DuplicateOrder),
            other => {
                GLOBAL_METRICS.record("seckill", "admit", "script_error");
                return Err(FlashError::Script(format!(
                    "seckill script returned unexpected code {}",
                    other
                )));
            }
        };

        let label = match outcome {
            SeckillOutcome::Admitted { .. } => "admitted",
            SeckillOutcome::Rejected(RejectReason::InsufficientStock) => "no_stock",
            SeckillOutcome::Rejected(RejectReason::DuplicateOrder) => "duplicate",
        };
        GLOBAL_METRICS.record("seckill", "admit", label);
        GLOBAL_METRICS.record_duration("seckill", "admit", started.elapsed());
        Ok(outcome)
    }

    /// 停止流水线
    ///
    /// 先拒绝新的准入，再等待后台任务在超时内排空队列，超时后取消
    pub async fn shutdown(&self) {
        self.sender.write().await.take();

        let Some(mut handle) = self.worker.lock().await.take() else {
            return;
        };
        match tokio::time::timeout(self.config.shutdown_timeout(), &mut handle).await {
            Ok(Ok(())) => info!("Seckill pipeline drained"),
            Ok(Err(e)) => error!("Order worker terminated abnormally: {}", e),
            Err(_) => {
                warn!(
                    "Order queue not drained within {:?}, cancelling worker",
                    self.config.shutdown_timeout()
                );
                self.cancel.cancel();
                if let Err(e) = handle.await {
                    error!("Order worker terminated abnormally: {}", e);
                }
            }
        }
    }
}
