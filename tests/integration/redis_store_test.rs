//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! Redis远程存储集成测试，需要可用的 Redis（REDIS_URL），不可用时跳过

#[path = "../common/mod.rs"]
mod common;

use common::{redis_store, setup_logging, unique_name};
use oxflash::backend::{RemoteStore, SECKILL_SCRIPT, UNLOCK_SCRIPT};
use oxflash::lock::DistributedLock;
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;

async fn store_or_skip(test: &str) -> Option<Arc<dyn RemoteStore>> {
    setup_logging();
    let store = redis_store().await;
    if store.is_none() {
        println!("Skipping {}: Redis is not available", test);
    }
    store
}

#[tokio::test]
#[serial]
async fn test_string_commands() {
    let Some(store) = store_or_skip("test_string_commands").await else {
        return;
    };
    let key = unique_name("oxflash:str");

    store.set(&key, "v1", Some(Duration::from_secs(5))).await.unwrap();
    assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("v1"));

    assert!(!store
        .set_if_absent(&key, "v2", Duration::from_secs(5))
        .await
        .unwrap());
    assert!(store.delete(&key).await.unwrap());
    assert!(!store.delete(&key).await.unwrap());
    assert!(store
        .set_if_absent(&key, "v2", Duration::from_millis(100))
        .await
        .unwrap());

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(store.get(&key).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn test_counter_and_expire() {
    let Some(store) = store_or_skip("test_counter_and_expire").await else {
        return;
    };
    let key = unique_name("oxflash:icr");

    assert_eq!(store.incr(&key).await.unwrap(), 1);
    assert_eq!(store.incr(&key).await.unwrap(), 2);
    assert!(store.expire(&key, Duration::from_secs(5)).await.unwrap());
    store.delete(&key).await.unwrap();
    assert!(!store.expire(&key, Duration::from_secs(5)).await.unwrap());
}

#[tokio::test]
#[serial]
async fn test_hash_and_sorted_set_commands() {
    let Some(store) = store_or_skip("test_hash_and_sorted_set_commands").await else {
        return;
    };
    let hash = unique_name("oxflash:hash");
    store
        .hash_set_all(
            &hash,
            &[
                ("name".to_string(), "shop".to_string()),
                ("score".to_string(), "45".to_string()),
            ],
        )
        .await
        .unwrap();
    let fields = store.hash_get_all(&hash).await.unwrap();
    assert_eq!(fields.get("score").map(String::as_str), Some("45"));
    assert_eq!(fields.len(), 2);

    let zset = unique_name("oxflash:zset");
    assert!(store.zset_add(&zset, "a", 2.0).await.unwrap());
    assert!(store.zset_add(&zset, "b", 1.0).await.unwrap());
    assert!(!store.zset_add(&zset, "a", 3.0).await.unwrap());
    assert_eq!(store.zset_score(&zset, "a").await.unwrap(), Some(3.0));
    assert_eq!(
        store.zset_range(&zset, 0, -1).await.unwrap(),
        vec!["b".to_string(), "a".to_string()]
    );
    assert!(store.zset_remove(&zset, "b").await.unwrap());
    assert_eq!(store.zset_score(&zset, "b").await.unwrap(), None);

    store.delete(&hash).await.unwrap();
    store.delete(&zset).await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_seckill_script_codes() {
    let Some(store) = store_or_skip("test_seckill_script_codes").await else {
        return;
    };
    let tag = unique_name("v");
    let stock = format!("oxflash:stock:{{{}}}", tag);
    let orders = format!("oxflash:order:{{{}}}", tag);
    let keys = [stock.clone(), orders.clone()];
    store.set(&stock, "1", None).await.unwrap();

    let user = |id: i64| [id.to_string()];
    assert_eq!(store.eval(&SECKILL_SCRIPT, &keys, &user(1)).await.unwrap(), 0);
    assert_eq!(store.eval(&SECKILL_SCRIPT, &keys, &user(1)).await.unwrap(), 2);
    assert_eq!(store.eval(&SECKILL_SCRIPT, &keys, &user(2)).await.unwrap(), 1);
    assert_eq!(store.get(&stock).await.unwrap().as_deref(), Some("0"));

    store.delete(&stock).await.unwrap();
    store.delete(&orders).await.unwrap();
    // 库存键不存在视为无库存
    assert_eq!(store.eval(&SECKILL_SCRIPT, &keys, &user(3)).await.unwrap(), 1);
}

#[tokio::test]
#[serial]
async fn test_unlock_script_checks_owner() {
    let Some(store) = store_or_skip("test_unlock_script_checks_owner").await else {
        return;
    };
    let key = unique_name("oxflash:lock");
    store.set(&key, "owner-a", Some(Duration::from_secs(5))).await.unwrap();

    let keys = [key.clone()];
    assert_eq!(
        store.eval(&UNLOCK_SCRIPT, &keys, &["owner-b".to_string()]).await.unwrap(),
        0
    );
    assert_eq!(
        store.eval(&UNLOCK_SCRIPT, &keys, &["owner-a".to_string()]).await.unwrap(),
        1
    );
    assert!(store.get(&key).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn test_distributed_lock_against_redis() {
    let Some(store) = store_or_skip("test_distributed_lock_against_redis").await else {
        return;
    };
    let lock = DistributedLock::new(store.clone(), "oxflash:lock:");
    let name = unique_name("order");

    let token = lock
        .try_lock(&name, Duration::from_secs(5))
        .await
        .unwrap()
        .expect("lock should be free");
    assert!(lock
        .try_lock(&name, Duration::from_secs(5))
        .await
        .unwrap()
        .is_none());
    assert!(lock.unlock(&token).await.unwrap());
    assert!(!lock.unlock(&token).await.unwrap());
}
