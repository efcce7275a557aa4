//! Shared contract checks run against every backend.
//!
//! Each check starts from `clear()` so backends can be reused across checks.

#![allow(dead_code)]

use std::time::Duration;

use polycache::{Cache, CacheError, CacheEvent, CacheKey};
use serde_json::json;

pub async fn set_get_del_scenario(cache: &dyn Cache) {
    assert!(cache.clear().await.unwrap());
    let key = CacheKey::from("k");

    assert!(cache.set(&key, &json!({"a": 1}), None).await.unwrap());
    assert_eq!(cache.get(&key).await.unwrap(), Some(json!({"a": 1})));
    assert_eq!(cache.del(&key).await.unwrap(), 1);
    assert_eq!(cache.get(&key).await.unwrap(), None);
    assert_eq!(cache.del(&key).await.unwrap(), 0);
}

pub async fn structured_values_roundtrip(cache: &dyn Cache) {
    assert!(cache.clear().await.unwrap());
    let values = [
        json!(true),
        json!(-12.5),
        json!("text with \"quotes\""),
        json!([1, [2, {"three": null}]]),
        json!({"nested": {"list": ["a", "b"], "flag": false}}),
    ];

    for (i, value) in values.iter().enumerate() {
        let key = CacheKey::from(json!({"case": i as i64}));
        assert!(cache.set(&key, value, None).await.unwrap());
        assert_eq!(cache.get(&key).await.unwrap().as_ref(), Some(value));
    }
}

pub async fn overwrite_replaces_value(cache: &dyn Cache) {
    assert!(cache.clear().await.unwrap());
    let key = CacheKey::from("k");

    cache.set(&key, &json!(1), None).await.unwrap();
    cache.set(&key, &json!(2), None).await.unwrap();

    assert_eq!(cache.get(&key).await.unwrap(), Some(json!(2)));
    assert_eq!(cache.keys().await.unwrap(), vec![key]);
}

pub async fn includes_matches_get(cache: &dyn Cache) {
    assert!(cache.clear().await.unwrap());
    let present = CacheKey::from("present");
    let absent = CacheKey::from("absent");
    cache.set(&present, &json!("v"), None).await.unwrap();

    for key in [&present, &absent] {
        let found = cache.get(key).await.unwrap().is_some();
        assert_eq!(cache.includes(key).await.unwrap(), found);
    }
}

pub async fn clear_removes_everything(cache: &dyn Cache) {
    assert!(cache.clear().await.unwrap());
    let keys = [CacheKey::from("a"), CacheKey::from("b")];
    for key in &keys {
        cache.set(key, &json!(1), None).await.unwrap();
    }

    let mut events = cache.subscribe();
    assert!(cache.clear().await.unwrap());

    assert_eq!(events.recv().await.unwrap(), CacheEvent::Flush);
    assert!(cache.keys().await.unwrap().is_empty());
    for key in &keys {
        assert!(!cache.includes(key).await.unwrap());
    }
}

pub async fn take_removes_value(cache: &dyn Cache) {
    assert!(cache.clear().await.unwrap());
    let key = CacheKey::from("k");
    cache.set(&key, &json!([1, 2]), None).await.unwrap();

    assert_eq!(cache.take(&key).await.unwrap(), Some(json!([1, 2])));
    assert!(!cache.includes(&key).await.unwrap());
    assert_eq!(cache.take(&key).await.unwrap(), None);
}

pub async fn bulk_operations(cache: &dyn Cache) {
    assert!(cache.clear().await.unwrap());
    let keys = vec![CacheKey::from("k1"), CacheKey::from("k2")];
    let values = vec![json!("v1"), json!({"v": 2})];

    assert!(cache.mset(&keys, &values, None).await.unwrap());

    let mut request = keys.clone();
    request.push(CacheKey::from("missing"));
    let found = cache.mget(&request).await.unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[&keys[0]], values[0]);
    assert_eq!(found[&keys[1]], values[1]);

    let listed = cache.list().await.unwrap();
    assert_eq!(listed, found);

    assert_eq!(cache.mdel(&request).await.unwrap(), 2);
    assert!(cache.mget(&keys).await.unwrap().is_empty());
    assert!(cache.mget(&[]).await.unwrap().is_empty());
}

pub async fn mset_length_mismatch_writes_nothing(cache: &dyn Cache) {
    assert!(cache.clear().await.unwrap());
    let keys = vec![CacheKey::from("k1"), CacheKey::from("k2")];

    let result = cache.mset(&keys, &[json!(1)], None).await;
    assert!(matches!(
        result,
        Err(CacheError::LengthMismatch { keys: 2, values: 1 })
    ));
    assert!(cache.keys().await.unwrap().is_empty());
}

pub async fn oversized_key_rejected(cache: &dyn Cache) {
    assert!(cache.clear().await.unwrap());
    let key = CacheKey::from("x".repeat(300));

    let result = cache.set(&key, &json!(1), None).await;
    assert!(matches!(result, Err(CacheError::KeyTooLong { .. })));

    let result = cache.mset(&[key], &[json!(1)], None).await;
    assert!(matches!(result, Err(CacheError::KeyTooLong { .. })));
    assert!(cache.keys().await.unwrap().is_empty());
}

pub async fn ttl_bookkeeping(cache: &dyn Cache) {
    assert!(cache.clear().await.unwrap());
    let key = CacheKey::from("k");

    cache.set(&key, &json!(1), Some(60)).await.unwrap();
    let remaining = cache.get_ttl(&key).await.unwrap().unwrap();
    assert!(remaining > 0 && remaining <= 60, "remaining = {}", remaining);

    assert!(cache.ttl(&key, Some(600)).await.unwrap());
    let remaining = cache.get_ttl(&key).await.unwrap().unwrap();
    assert!(remaining > 60 && remaining <= 600, "remaining = {}", remaining);
    assert_eq!(cache.get(&key).await.unwrap(), Some(json!(1)));

    let missing = CacheKey::from("missing");
    assert!(!cache.ttl(&missing, None).await.unwrap());
    assert_eq!(cache.get_ttl(&missing).await.unwrap(), None);
}

pub async fn entries_expire(cache: &dyn Cache) {
    assert!(cache.clear().await.unwrap());
    let key = CacheKey::from("short");

    cache.set(&key, &json!(1), Some(1)).await.unwrap();
    assert!(cache.includes(&key).await.unwrap());

    // Second-granularity backends may keep the entry through the next second
    tokio::time::sleep(Duration::from_millis(2100)).await;

    assert_eq!(cache.get(&key).await.unwrap(), None);
    assert!(!cache.includes(&key).await.unwrap());
    assert_eq!(cache.get_ttl(&key).await.unwrap(), None);
    assert!(cache.keys().await.unwrap().is_empty());
}

pub async fn zero_ttl_rejected(cache: &dyn Cache) {
    assert!(cache.clear().await.unwrap());
    let key = CacheKey::from("k");

    let result = cache.set(&key, &json!(1), Some(0)).await;
    assert!(matches!(result, Err(CacheError::ZeroTtl)));
    let result = cache.mset(&[key.clone()], &[json!(1)], Some(0)).await;
    assert!(matches!(result, Err(CacheError::ZeroTtl)));
    assert!(cache.keys().await.unwrap().is_empty());

    cache.set(&key, &json!(1), None).await.unwrap();
    let result = cache.ttl(&key, Some(0)).await;
    assert!(matches!(result, Err(CacheError::ZeroTtl)));
    assert_eq!(cache.get(&key).await.unwrap(), Some(json!(1)));
}

/// Larger than any single bulk statement a backend issues.
pub const LARGE_BULK: usize = 2500;

pub async fn large_bulk_operations(cache: &dyn Cache) {
    assert!(cache.clear().await.unwrap());
    let keys: Vec<CacheKey> = (0..LARGE_BULK as i64).map(CacheKey::from).collect();
    let values: Vec<_> = (0..LARGE_BULK as i64).map(|i| json!([i, "v"])).collect();

    assert!(cache.mset(&keys, &values, None).await.unwrap());

    let found = cache.mget(&keys).await.unwrap();
    assert_eq!(found.len(), LARGE_BULK);
    assert_eq!(found[&keys[LARGE_BULK - 1]], values[LARGE_BULK - 1]);
    assert_eq!(cache.keys().await.unwrap().len(), LARGE_BULK);

    assert_eq!(cache.mdel(&keys).await.unwrap(), LARGE_BULK);
    assert!(cache.keys().await.unwrap().is_empty());
}

/// `includes`, `get` and `get_ttl` agree while an entry crosses its
/// expiration instant. Reads bracketed by two equal `includes` results
/// must match them.
pub async fn reads_agree_across_expiry(cache: &dyn Cache) {
    assert!(cache.clear().await.unwrap());
    let key = CacheKey::from("edge");
    cache.set(&key, &json!("v"), Some(1)).await.unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_millis(2500);
    while tokio::time::Instant::now() < deadline {
        let before = cache.includes(&key).await.unwrap();
        let value = cache.get(&key).await.unwrap();
        let remaining = cache.get_ttl(&key).await.unwrap();
        let after = cache.includes(&key).await.unwrap();

        if before == after {
            assert_eq!(value.is_some(), before);
            assert_eq!(remaining.is_some(), before);
        }
        if let Some(seconds) = remaining {
            assert_eq!(seconds, 1);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    assert!(!cache.includes(&key).await.unwrap());
    assert_eq!(cache.get(&key).await.unwrap(), None);
}

pub async fn mutations_notify_after_write(cache: &dyn Cache) {
    assert!(cache.clear().await.unwrap());
    let key = CacheKey::from("k");
    let mut events = cache.subscribe();

    cache.set(&key, &json!("v"), None).await.unwrap();
    cache.del(&key).await.unwrap();

    assert_eq!(
        events.recv().await.unwrap(),
        CacheEvent::Set {
            key: key.clone(),
            value: json!("v")
        }
    );
    match events.recv().await.unwrap() {
        CacheEvent::Del { key: deleted, .. } => assert_eq!(deleted, key),
        other => panic!("unexpected event: {:?}", other),
    }
}

/// Runs every check in sequence.
pub async fn run_contract_suite(cache: &dyn Cache) {
    set_get_del_scenario(cache).await;
    structured_values_roundtrip(cache).await;
    overwrite_replaces_value(cache).await;
    includes_matches_get(cache).await;
    clear_removes_everything(cache).await;
    take_removes_value(cache).await;
    bulk_operations(cache).await;
    mset_length_mismatch_writes_nothing(cache).await;
    oversized_key_rejected(cache).await;
    ttl_bookkeeping(cache).await;
    mutations_notify_after_write(cache).await;
    zero_ttl_rejected(cache).await;
    large_bulk_operations(cache).await;
    entries_expire(cache).await;
    reads_agree_across_expiry(cache).await;
}
