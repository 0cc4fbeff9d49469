//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 订单后台任务故障测试：单个任务失败不会终止消费循环，队列满时准入阻塞

#[path = "../common/mod.rs"]
mod common;

use async_trait::async_trait;
use common::{memory_store, setup_logging};
use mockall::mock;
use oxflash::backend::RemoteStore;
use oxflash::config::{IdConfig, RetryPolicy, SeckillConfig};
use oxflash::database::OrderStore;
use oxflash::error::{FlashError, Result};
use oxflash::id::IdGenerator;
use oxflash::lock::DistributedLock;
use oxflash::metrics::GLOBAL_METRICS;
use oxflash::seckill::{CommitOutcome, SeckillPipeline, UserContext, VoucherOrder};
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

mock! {
    pub Orders {}

    #[async_trait]
    impl OrderStore for Orders {
        async fn create_voucher_order(&self, order: &VoucherOrder) -> Result<CommitOutcome>;
    }
}

/// 记录落库的用户；`panic_on_user` 对应的调用直接 panic
struct RecordingStore {
    committed: Mutex<Vec<i64>>,
    panic_on_user: Option<i64>,
}

#[async_trait]
impl OrderStore for RecordingStore {
    async fn create_voucher_order(&self, order: &VoucherOrder) -> Result<CommitOutcome> {
        if self.panic_on_user == Some(order.user_id) {
            panic!("simulated crash for user {}", order.user_id);
        }
        self.committed.lock().unwrap().push(order.user_id);
        Ok(CommitOutcome::Committed)
    }
}

/// 每次落库都需等待放行，用于让后台任务停在落库处
struct GatedStore {
    gate: Semaphore,
    entered: AtomicUsize,
    committed: Mutex<Vec<i64>>,
}

impl GatedStore {
    fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            entered: AtomicUsize::new(0),
            committed: Mutex::new(Vec::new()),
        }
    }

    async fn wait_entered(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.entered.load(Ordering::SeqCst) < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("worker never reached the order store");
    }
}

#[async_trait]
impl OrderStore for GatedStore {
    async fn create_voucher_order(&self, order: &VoucherOrder) -> Result<CommitOutcome> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        self.gate.acquire().await.unwrap().forget();
        self.committed.lock().unwrap().push(order.user_id);
        Ok(CommitOutcome::Committed)
    }
}

fn start(
    store: &Arc<dyn RemoteStore>,
    orders: Arc<dyn OrderStore>,
    config: SeckillConfig,
) -> SeckillPipeline {
    SeckillPipeline::start(
        store.clone(),
        IdGenerator::new(store.clone(), &IdConfig::default()),
        DistributedLock::new(store.clone(), "lock:"),
        orders,
        config,
    )
}

async fn admit_all(pipeline: &SeckillPipeline, voucher_id: i64, users: &[i64]) {
    for &user_id in users {
        let outcome = pipeline
            .acquire_seckill_order(&UserContext::new(user_id), voucher_id)
            .await
            .unwrap();
        assert!(outcome.is_admitted(), "user {} should be admitted", user_id);
    }
}

#[tokio::test]
#[serial]
async fn test_persistence_error_drops_task_and_worker_continues() {
    setup_logging();
    let store = memory_store();
    let calls = Arc::new(AtomicUsize::new(0));

    let mut orders = MockOrders::new();
    let counter = calls.clone();
    orders
        .expect_create_voucher_order()
        .times(3)
        .returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(FlashError::Database("connection reset".to_string()))
            } else {
                Ok(CommitOutcome::Committed)
            }
        });

    let dropped_before = GLOBAL_METRICS.count("worker", "commit", "dropped");
    let pipeline = start(&store, Arc::new(orders), SeckillConfig::default());
    pipeline.seed_stock(20, 10).await.unwrap();
    admit_all(&pipeline, 20, &[1, 2, 3]).await;
    pipeline.shutdown().await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        GLOBAL_METRICS.count("worker", "commit", "dropped") - dropped_before,
        1
    );
    for user_id in 1..=3 {
        let key = format!("lock:order:{}", user_id);
        assert!(store.get(&key).await.unwrap().is_none(), "{} leaked", key);
    }
}

#[tokio::test]
#[serial]
async fn test_panicking_store_does_not_kill_worker() {
    setup_logging();
    let store = memory_store();
    let recording = Arc::new(RecordingStore {
        committed: Mutex::new(Vec::new()),
        panic_on_user: Some(2),
    });

    let pipeline = start(&store, recording.clone(), SeckillConfig::default());
    pipeline.seed_stock(21, 10).await.unwrap();
    admit_all(&pipeline, 21, &[1, 2, 3]).await;
    pipeline.shutdown().await;

    assert_eq!(*recording.committed.lock().unwrap(), vec![1, 3]);
    assert!(store.get("lock:order:2").await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn test_lock_contention_drops_only_the_blocked_task() {
    setup_logging();
    let store = memory_store();
    let recording = Arc::new(RecordingStore {
        committed: Mutex::new(Vec::new()),
        panic_on_user: None,
    });

    // 另一个实例正持有用户 5 的订单锁
    let foreign = DistributedLock::new(store.clone(), "lock:");
    let _held = foreign
        .try_lock("order:5", Duration::from_secs(30))
        .await
        .unwrap()
        .unwrap();

    let config = SeckillConfig {
        lock_retry: RetryPolicy::new(2, 10),
        ..SeckillConfig::default()
    };
    let pipeline = start(&store, recording.clone(), config);
    pipeline.seed_stock(22, 10).await.unwrap();
    admit_all(&pipeline, 22, &[5, 6]).await;
    pipeline.shutdown().await;

    assert_eq!(*recording.committed.lock().unwrap(), vec![6]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_shutdown_timeout_cancels_stuck_worker() {
    setup_logging();
    let store = memory_store();

    let mut orders = MockOrders::new();
    orders.expect_create_voucher_order().returning(|_| {
        // 阻塞当前 worker 线程，模拟卡住的落库
        std::thread::sleep(Duration::from_millis(200));
        Ok(CommitOutcome::Committed)
    });

    let config = SeckillConfig {
        shutdown_timeout_ms: 50,
        ..SeckillConfig::default()
    };
    let pipeline = start(&store, Arc::new(orders), config);
    pipeline.seed_stock(23, 100).await.unwrap();
    admit_all(&pipeline, 23, &(1..=20).collect::<Vec<_>>()).await;

    let started = std::time::Instant::now();
    pipeline.shutdown().await;
    // 20 个任务全部落库至少需要 4 秒
    assert!(started.elapsed() < Duration::from_secs(2));

    let err = pipeline
        .acquire_seckill_order(&UserContext::new(99), 23)
        .await
        .unwrap_err();
    assert!(matches!(err, FlashError::QueueClosed(_)));
}

#[tokio::test]
#[serial]
async fn test_full_queue_blocks_admission_until_worker_drains() {
    setup_logging();
    let store = memory_store();
    let gated = Arc::new(GatedStore::new());

    let config = SeckillConfig {
        queue_capacity: 1,
        ..SeckillConfig::default()
    };
    let pipeline = Arc::new(start(&store, gated.clone(), config));
    pipeline.seed_stock(24, 10).await.unwrap();

    // 第一个任务被后台任务取走并停在落库处，第二个任务占满队列
    admit_all(&pipeline, 24, &[1]).await;
    gated.wait_entered(1).await;
    admit_all(&pipeline, 24, &[2]).await;

    let mut third = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            pipeline
                .acquire_seckill_order(&UserContext::new(3), 24)
                .await
        })
    };
    assert!(
        tokio::time::timeout(Duration::from_millis(100), &mut third)
            .await
            .is_err(),
        "admission must wait while the queue is full"
    );

    gated.gate.add_permits(3);
    let outcome = third.await.unwrap().unwrap();
    assert!(outcome.is_admitted());

    pipeline.shutdown().await;
    assert_eq!(*gated.committed.lock().unwrap(), vec![1, 2, 3]);
    let stock_key = pipeline.stock_key(24);
    assert_eq!(store.get(&stock_key).await.unwrap().as_deref(), Some("7"));
}
