//! Memory Backend
//!
//! Wraps the process-local [`ExpiringMap`] behind the async cache contract.
//! Ready immediately after construction; connect/disconnect only start and
//! stop the active expiry sweep.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{BackendCore, Cache};
use crate::config::MemoryConfig;
use crate::error::Result;
use crate::models::{CacheEvent, CacheKey};
use crate::store::{ExpiringMap, StoreStats};
use crate::tasks::{spawn_sweep_task, Sweep};

/// Sweeps the shared map on the background timer.
struct MemorySweep {
    store: Arc<RwLock<ExpiringMap>>,
    core: BackendCore,
}

#[async_trait]
impl Sweep for MemorySweep {
    fn name(&self) -> &'static str {
        self.core.name()
    }

    async fn sweep_expired(&self) -> Result<usize> {
        let removed = self.store.write().await.cleanup_expired();
        if removed > 0 {
            self.core.emit(CacheEvent::Expired { count: removed });
        }
        Ok(removed)
    }
}

/// In-process cache backend.
pub struct MemoryCache {
    core: BackendCore,
    store: Arc<RwLock<ExpiringMap>>,
    sweep_interval: u64,
    ready: AtomicBool,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryCache {
    // == Constructor ==
    /// Creates a ready memory backend.
    ///
    /// When called inside a Tokio runtime the active expiry sweep starts
    /// immediately; otherwise expired entries are only dropped on access
    /// until [`Cache::connect`] runs inside one.
    pub fn new(config: MemoryConfig) -> Result<Self> {
        config.validate()?;

        let cache = Self {
            core: BackendCore::new("memory", config.default_ttl),
            store: Arc::new(RwLock::new(ExpiringMap::new())),
            sweep_interval: config.sweep_interval(),
            ready: AtomicBool::new(true),
            sweeper: Mutex::new(None),
        };
        cache.start_sweeper();
        Ok(cache)
    }

    /// Read statistics of the underlying map.
    pub async fn stats(&self) -> StoreStats {
        self.store.read().await.stats()
    }

    fn start_sweeper(&self) {
        if Handle::try_current().is_err() {
            debug!("No Tokio runtime available, memory sweep not started");
            return;
        }
        let Ok(mut slot) = self.sweeper.lock() else {
            return;
        };
        if slot.is_none() {
            let sweep = MemorySweep {
                store: self.store.clone(),
                core: self.core.clone(),
            };
            *slot = Some(spawn_sweep_task(Arc::new(sweep), self.sweep_interval));
        }
    }

    fn stop_sweeper(&self) {
        if let Some(handle) = self.sweeper.lock().ok().and_then(|mut slot| slot.take()) {
            handle.abort();
        }
    }

    /// Idempotent guard run before every operation.
    async fn ensure_connected(&self) -> Result<()> {
        if !self.is_ready() {
            self.connect().await?;
        }
        Ok(())
    }

    fn decode_pairs(pairs: Vec<(String, String)>) -> Result<HashMap<CacheKey, Value>> {
        pairs
            .into_iter()
            .map(|(key, value)| -> Result<(CacheKey, Value)> {
                Ok((CacheKey::from_encoded(key), BackendCore::decode_value(&value)?))
            })
            .collect()
    }

    async fn try_mset(&self, keys: &[CacheKey], values: &[Value], ttl: u64) -> Result<bool> {
        let encoded = values
            .iter()
            .map(BackendCore::encode_value)
            .collect::<Result<Vec<_>>>()?;
        {
            let mut store = self.store.write().await;
            for (key, value) in keys.iter().zip(encoded) {
                store.set(key.as_str().to_string(), value, ttl);
            }
        }
        for (key, value) in keys.iter().zip(values) {
            self.core.emit_set(key, value);
        }
        Ok(true)
    }
}

#[async_trait]
impl Cache for MemoryCache {
    fn backend_name(&self) -> &'static str {
        self.core.name()
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.core.subscribe()
    }

    async fn connect(&self) -> Result<()> {
        self.start_sweeper();
        if !self.ready.swap(true, Ordering::SeqCst) {
            info!("Memory cache connected");
            self.core.emit(CacheEvent::Connect);
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.stop_sweeper();
        if self.ready.swap(false, Ordering::SeqCst) {
            let dropped = self.store.write().await.flush();
            info!("Memory cache disconnected, released {} entries", dropped);
            self.core.emit(CacheEvent::Disconnect);
        }
        Ok(())
    }

    async fn set(&self, key: &CacheKey, value: &Value, ttl: Option<u64>) -> Result<bool> {
        BackendCore::validate_key(key)?;
        let ttl = self.core.resolve_ttl(ttl)?;
        let outcome: Result<bool> = async {
            self.ensure_connected().await?;
            let encoded = BackendCore::encode_value(value)?;
            self.store
                .write()
                .await
                .set(key.as_str().to_string(), encoded, ttl);
            self.core.emit_set(key, value);
            Ok(true)
        }
        .await;
        self.core.settle("set", outcome)
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<Value>> {
        self.ensure_connected().await?;
        let encoded = self.store.write().await.get(key.as_str());
        encoded.map(|v| BackendCore::decode_value(&v)).transpose()
    }

    async fn includes(&self, key: &CacheKey) -> Result<bool> {
        self.ensure_connected().await?;
        Ok(self.store.write().await.contains(key.as_str()))
    }

    async fn del(&self, key: &CacheKey) -> Result<usize> {
        let outcome: Result<usize> = async {
            self.ensure_connected().await?;
            let removed = self.store.write().await.delete(key.as_str());
            match removed {
                Some(encoded) => {
                    self.core
                        .emit_del(key, BackendCore::decode_value(&encoded).ok());
                    Ok(1)
                }
                None => Ok(0),
            }
        }
        .await;
        self.core.settle("del", outcome)
    }

    async fn clear(&self) -> Result<bool> {
        let outcome: Result<bool> = async {
            self.ensure_connected().await?;
            self.store.write().await.flush();
            self.core.emit(CacheEvent::Flush);
            Ok(true)
        }
        .await;
        self.core.settle("clear", outcome)
    }

    async fn keys(&self) -> Result<Vec<CacheKey>> {
        let outcome: Result<Vec<CacheKey>> = async {
            self.ensure_connected().await?;
            let keys = self.store.read().await.keys();
            Ok(keys.into_iter().map(CacheKey::from_encoded).collect())
        }
        .await;
        self.core.settle("keys", outcome)
    }

    async fn mget(&self, keys: &[CacheKey]) -> Result<HashMap<CacheKey, Value>> {
        self.ensure_connected().await?;
        let pairs: Vec<(String, String)> = {
            let mut store = self.store.write().await;
            keys.iter()
                .filter_map(|key| {
                    store
                        .get(key.as_str())
                        .map(|value| (key.as_str().to_string(), value))
                })
                .collect()
        };
        Self::decode_pairs(pairs)
    }

    async fn mdel(&self, keys: &[CacheKey]) -> Result<usize> {
        let outcome: Result<usize> = async {
            self.ensure_connected().await?;
            let removed: Vec<(&CacheKey, String)> = {
                let mut store = self.store.write().await;
                keys.iter()
                    .filter_map(|key| store.delete(key.as_str()).map(|value| (key, value)))
                    .collect()
            };
            for (key, encoded) in &removed {
                self.core
                    .emit_del(key, BackendCore::decode_value(encoded).ok());
            }
            Ok(removed.len())
        }
        .await;
        self.core.settle("mdel", outcome)
    }

    async fn mset(&self, keys: &[CacheKey], values: &[Value], ttl: Option<u64>) -> Result<bool> {
        BackendCore::validate_bulk(keys, values)?;
        let ttl = self.core.resolve_ttl(ttl)?;
        let outcome: Result<bool> = async {
            self.ensure_connected().await?;
            self.try_mset(keys, values, ttl).await
        }
        .await;
        self.core.settle("mset", outcome)
    }

    async fn list(&self) -> Result<HashMap<CacheKey, Value>> {
        let outcome: Result<HashMap<CacheKey, Value>> = async {
            self.ensure_connected().await?;
            let pairs = self.store.read().await.entries();
            Self::decode_pairs(pairs)
        }
        .await;
        self.core.settle("list", outcome)
    }

    async fn ttl(&self, key: &CacheKey, ttl: Option<u64>) -> Result<bool> {
        let ttl = self.core.resolve_ttl(ttl)?;
        let outcome: Result<bool> = async {
            self.ensure_connected().await?;
            Ok(self.store.write().await.refresh(key.as_str(), ttl))
        }
        .await;
        self.core.settle("ttl", outcome)
    }

    async fn get_ttl(&self, key: &CacheKey) -> Result<Option<u64>> {
        self.ensure_connected().await?;
        Ok(self.store.write().await.ttl_remaining(key.as_str()))
    }

    async fn take(&self, key: &CacheKey) -> Result<Option<Value>> {
        self.ensure_connected().await?;
        let taken = self.store.write().await.take(key.as_str());
        let Some(encoded) = taken else {
            return Ok(None);
        };
        let value = BackendCore::decode_value(&encoded)?;
        self.core.emit_del(key, Some(value.clone()));
        Ok(Some(value))
    }
}

impl Drop for MemoryCache {
    fn drop(&mut self) {
        self.stop_sweeper();
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("default_ttl", &self.core.default_ttl())
            .field("sweep_interval", &self.sweep_interval)
            .field("ready", &self.is_ready())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn cache() -> MemoryCache {
        MemoryCache::new(MemoryConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_ready_after_construction() {
        let cache = cache();
        assert!(cache.is_ready());
        assert_eq!(cache.backend_name(), "memory");
    }

    #[tokio::test]
    async fn test_disconnect_releases_entries() {
        let cache = cache();
        let key = CacheKey::from("k");
        cache.set(&key, &json!(1), None).await.unwrap();

        cache.disconnect().await.unwrap();
        assert!(!cache.is_ready());

        // Next operation reconnects, the released entries are gone
        assert_eq!(cache.get(&key).await.unwrap(), None);
        assert!(cache.is_ready());
    }

    #[tokio::test]
    async fn test_set_emits_after_write() {
        let cache = cache();
        let mut events = cache.subscribe();
        let key = CacheKey::from("k");

        cache.set(&key, &json!({"a": 1}), None).await.unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            CacheEvent::Set {
                key: key.clone(),
                value: json!({"a": 1})
            }
        );
    }

    #[tokio::test]
    async fn test_stats_track_reads() {
        let cache = cache();
        let key = CacheKey::from("k");
        cache.set(&key, &json!(true), None).await.unwrap();

        cache.get(&key).await.unwrap();
        cache.get(&CacheKey::from("missing")).await.unwrap();

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.keys, 1);
    }

    #[tokio::test]
    async fn test_sweep_removes_expired_entries() {
        let cache = MemoryCache::new(MemoryConfig {
            default_ttl: 300,
            sweep_interval: Some(1),
        })
        .unwrap();
        let mut events = cache.subscribe();

        cache
            .set(&CacheKey::from("short"), &json!(1), Some(1))
            .await
            .unwrap();
        let _ = events.recv().await; // set

        // Wait for entry to expire and the sweep to run
        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert_eq!(cache.stats().await.keys, 0);
        assert_eq!(
            events.recv().await.unwrap(),
            CacheEvent::Expired { count: 1 }
        );
    }

    #[test]
    fn test_construct_outside_runtime() {
        let cache = cache();
        let value = tokio_test::block_on(async {
            cache.set(&CacheKey::from("k"), &json!("v"), None).await.unwrap();
            cache.get(&CacheKey::from("k")).await.unwrap()
        });
        assert_eq!(value, Some(json!("v")));
    }
}
