//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 缓存客户端集成测试：空值缓存、逻辑过期单次重建、互斥锁有界重试

#[path = "../common/mod.rs"]
mod common;

use common::{memory_store, sample_shop, setup_logging};
use oxflash::backend::RemoteStore;
use oxflash::catalog::Shop;
use oxflash::client::{CacheClient, NULL_MARKER};
use oxflash::config::{CacheConfig, RetryPolicy};
use oxflash::error::FlashError;
use oxflash::lock::DistributedLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

const PREFIX: &str = "test:shop:";
const TTL: Duration = Duration::from_secs(60);

fn client(store: &Arc<dyn RemoteStore>) -> CacheClient {
    CacheClient::new(store.clone(), &CacheConfig::default())
}

#[tokio::test]
async fn test_null_marker_suppresses_repeated_fallback() {
    setup_logging();
    let store = memory_store();
    let cache = client(&store);
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let calls = calls.clone();
        let result = cache
            .query_with_pass_through(
                PREFIX,
                404i64,
                move |_id| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<Option<Shop>, FlashError>(None)
                },
                TTL,
            )
            .await
            .unwrap();
        assert!(result.is_none());
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        store.get("test:shop:404").await.unwrap().as_deref(),
        Some(NULL_MARKER)
    );
}

#[tokio::test]
async fn test_pass_through_fills_once_and_reads_are_idempotent() {
    setup_logging();
    let store = memory_store();
    let cache = client(&store);
    let calls = Arc::new(AtomicUsize::new(0));

    let mut reads = Vec::new();
    for _ in 0..2 {
        let calls = calls.clone();
        let shop = cache
            .query_with_pass_through(
                PREFIX,
                1i64,
                move |id| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Some(sample_shop(id)))
                },
                TTL,
            )
            .await
            .unwrap();
        reads.push(shop);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(reads[0], reads[1]);
    assert_eq!(reads[0], Some(sample_shop(1)));
}

#[tokio::test]
async fn test_fallback_error_is_not_cached() {
    setup_logging();
    let store = memory_store();
    let cache = client(&store);

    let err = cache
        .query_with_pass_through(
            PREFIX,
            2i64,
            |_id| async { Err::<Option<Shop>, _>(FlashError::Database("down".to_string())) },
            TTL,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FlashError::Database(_)));
    assert!(store.get("test:shop:2").await.unwrap().is_none());
}

#[tokio::test]
async fn test_logical_expire_miss_never_calls_fallback() {
    setup_logging();
    let store = memory_store();
    let cache = client(&store);
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = calls.clone();
    let result = cache
        .query_with_logical_expire(
            PREFIX,
            3i64,
            move |id| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Some(sample_shop(id)))
            },
            TTL,
        )
        .await
        .unwrap();

    assert!(result.is_none());
    cache.wait_rebuilds().await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_logical_expire_fresh_hit_returns_cached_value() {
    setup_logging();
    let memory = Arc::new(oxflash::backend::MemoryStore::new());
    let store: Arc<dyn RemoteStore> = memory.clone();
    let cache = client(&store);
    cache
        .write_with_logical_expiry("test:shop:4", &sample_shop(4), TTL)
        .await
        .unwrap();

    let result = cache
        .query_with_logical_expire(
            PREFIX,
            4i64,
            |_id| async { Ok::<Option<Shop>, FlashError>(None) },
            TTL,
        )
        .await
        .unwrap();
    assert_eq!(result, Some(sample_shop(4)));
    // 逻辑过期条目没有物理过期时间
    assert_eq!(memory.time_to_live("test:shop:4").unwrap(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_logical_expire_single_rebuild_under_concurrency() {
    setup_logging();
    let store = memory_store();
    let cache = client(&store);
    let key = "test:shop:5";

    let mut stale = sample_shop(5);
    stale.name = "stale".to_string();
    cache
        .write_with_logical_expiry(key, &stale, Duration::ZERO)
        .await
        .unwrap();

    let readers = 50;
    let rebuilds = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(readers));
    let mut handles = Vec::new();

    for _ in 0..readers {
        let cache = cache.clone();
        let rebuilds = rebuilds.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            cache
                .query_with_logical_expire(
                    PREFIX,
                    5i64,
                    move |id| async move {
                        rebuilds.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(300)).await;
                        let mut fresh = sample_shop(id);
                        fresh.name = "fresh".to_string();
                        Ok(Some(fresh))
                    },
                    TTL,
                )
                .await
        }));
    }

    for handle in handles {
        let shop = handle.await.unwrap().unwrap().expect("entry must be present");
        // 重建耗时 300ms，读者不会等待它
        assert_eq!(shop.name, "stale");
    }

    cache.wait_rebuilds().await;
    assert_eq!(rebuilds.load(Ordering::SeqCst), 1);

    let after = cache
        .query_with_logical_expire(
            PREFIX,
            5i64,
            |_id| async { Ok::<Option<Shop>, FlashError>(None) },
            TTL,
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.name, "fresh");
    assert!(store.get("lock:test:shop:5").await.unwrap().is_none());
}

#[tokio::test]
async fn test_rebuild_failure_releases_lock_and_keeps_stale_value() {
    setup_logging();
    let store = memory_store();
    let cache = client(&store);
    cache
        .write_with_logical_expiry("test:shop:6", &sample_shop(6), Duration::ZERO)
        .await
        .unwrap();

    let result = cache
        .query_with_logical_expire(
            PREFIX,
            6i64,
            |_id| async { Err::<Option<Shop>, _>(FlashError::Database("down".to_string())) },
            TTL,
        )
        .await
        .unwrap();
    assert_eq!(result, Some(sample_shop(6)));

    cache.wait_rebuilds().await;
    assert!(store.get("lock:test:shop:6").await.unwrap().is_none());
    assert!(store.get("test:shop:6").await.unwrap().is_some());
}

#[tokio::test]
async fn test_rebuild_of_deleted_record_removes_entry() {
    setup_logging();
    let store = memory_store();
    let cache = client(&store);
    cache
        .write_with_logical_expiry("test:shop:7", &sample_shop(7), Duration::ZERO)
        .await
        .unwrap();

    let result = cache
        .query_with_logical_expire(
            PREFIX,
            7i64,
            |_id| async { Ok::<Option<Shop>, FlashError>(None) },
            TTL,
        )
        .await
        .unwrap();
    assert_eq!(result, Some(sample_shop(7)));

    cache.wait_rebuilds().await;
    assert!(store.get("test:shop:7").await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mutex_strategy_loads_once() {
    setup_logging();
    let store = memory_store();
    let cache = client(&store);
    let loads = Arc::new(AtomicUsize::new(0));
    let readers = 20;
    let barrier = Arc::new(Barrier::new(readers));
    let retry = RetryPolicy::new(100, 20);

    let mut handles = Vec::new();
    for _ in 0..readers {
        let cache = cache.clone();
        let loads = loads.clone();
        let barrier = barrier.clone();
        let retry = retry.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            cache
                .query_with_mutex(
                    PREFIX,
                    8i64,
                    move |id| async move {
                        loads.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok(Some(sample_shop(id)))
                    },
                    TTL,
                    &retry,
                )
                .await
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), Some(sample_shop(8)));
    }
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert!(store.get("lock:test:shop:8").await.unwrap().is_none());
}

#[tokio::test]
async fn test_mutex_strategy_gives_up_after_bounded_retries() {
    setup_logging();
    let store = memory_store();
    let cache = client(&store);
    let lock = DistributedLock::new(store.clone(), "lock:");
    let _held = lock
        .try_lock("test:shop:9", Duration::from_secs(30))
        .await
        .unwrap()
        .expect("lock should be free");

    let err = cache
        .query_with_mutex(
            PREFIX,
            9i64,
            |id| async move { Ok(Some(sample_shop(id))) },
            TTL,
            &RetryPolicy::new(3, 10),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FlashError::LockUnavailable(_)));
}

#[tokio::test]
async fn test_write_sets_physical_ttl() {
    setup_logging();
    let memory = Arc::new(oxflash::backend::MemoryStore::new());
    let store: Arc<dyn RemoteStore> = memory.clone();
    let cache = client(&store);

    cache
        .write("test:shop:10", &sample_shop(10), Duration::from_secs(30))
        .await
        .unwrap();
    let ttl = memory.time_to_live("test:shop:10").unwrap().unwrap();
    assert!(ttl <= Duration::from_secs(30) && ttl > Duration::from_secs(25));

    assert!(cache.invalidate("test:shop:10").await.unwrap());
    assert!(store.get("test:shop:10").await.unwrap().is_none());
}
