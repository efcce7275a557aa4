//! Integration Tests for the Memory Backend
//!
//! Runs the shared contract checks against the in-process store.

mod common;

use std::time::Duration;

use polycache::{Cache, CacheEvent, CacheKey, MemoryCache, MemoryConfig};
use serde_json::json;

// == Helper Functions ==

fn create_cache() -> MemoryCache {
    MemoryCache::new(MemoryConfig::default()).unwrap()
}

// == Contract ==

#[tokio::test]
async fn test_memory_contract() {
    let cache = create_cache();
    common::run_contract_suite(&cache).await;
}

#[tokio::test]
async fn test_memory_contract_through_trait_object() {
    let cache: Box<dyn Cache> = Box::new(create_cache());
    common::set_get_del_scenario(cache.as_ref()).await;
    common::bulk_operations(cache.as_ref()).await;
}

// == Lifecycle ==

#[tokio::test]
async fn test_connect_is_idempotent() {
    let cache = create_cache();
    let mut events = cache.subscribe();

    cache.connect().await.unwrap();
    cache.connect().await.unwrap();
    assert!(cache.is_ready());

    // Already ready at construction, so no connect notification
    cache.set(&CacheKey::from("k"), &json!(1), None).await.unwrap();
    assert!(matches!(
        events.recv().await.unwrap(),
        CacheEvent::Set { .. }
    ));
}

#[tokio::test]
async fn test_disconnect_then_connect() {
    let cache = create_cache();
    let mut events = cache.subscribe();

    cache.disconnect().await.unwrap();
    cache.disconnect().await.unwrap();
    cache.connect().await.unwrap();

    assert_eq!(events.recv().await.unwrap(), CacheEvent::Disconnect);
    assert_eq!(events.recv().await.unwrap(), CacheEvent::Connect);
}

// == Expiry ==

#[tokio::test]
async fn test_active_sweep_reports_expired_count() {
    let cache = MemoryCache::new(MemoryConfig {
        default_ttl: 1,
        sweep_interval: Some(1),
    })
    .unwrap();
    let keys = vec![CacheKey::from("a"), CacheKey::from("b")];
    cache.mset(&keys, &[json!(1), json!(2)], None).await.unwrap();
    let mut events = cache.subscribe();

    tokio::time::sleep(Duration::from_millis(2500)).await;

    // Entries written a millisecond apart may land in different sweeps
    let mut expired = 0;
    while let Ok(event) = events.try_recv() {
        if let CacheEvent::Expired { count } = event {
            expired += count;
        }
    }
    assert_eq!(expired, 2);
    assert_eq!(cache.stats().await.keys, 0);
}

#[tokio::test]
async fn test_ttl_refresh_keeps_entry_alive() {
    let cache = create_cache();
    let key = CacheKey::from("k");
    cache.set(&key, &json!("v"), Some(1)).await.unwrap();

    assert!(cache.ttl(&key, Some(60)).await.unwrap());
    tokio::time::sleep(Duration::from_millis(1200)).await;

    assert_eq!(cache.get(&key).await.unwrap(), Some(json!("v")));
}
