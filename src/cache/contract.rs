//! Cache Contract
//!
//! The capability set every backend implements identically.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::models::{CacheEvent, CacheKey};

/// Uniform key/value cache with time-to-live semantics.
///
/// `ttl` arguments are in seconds; `None` means the backend's configured
/// default TTL. A TTL of zero is a validation error in every backend.
///
/// Mutations are best-effort: a transient backend failure yields `Ok(false)`
/// or `Ok(0)` and is reported on the notification channel. `Err` from a
/// mutation always means a validation failure (oversized key, mismatched
/// bulk lengths or a zero TTL) detected before any backend I/O.
///
/// # Example
///
/// ```ignore
/// let cache = MemoryCache::new(MemoryConfig::default())?;
/// cache.set(&"k".into(), &json!({"a": 1}), None).await?;
/// assert_eq!(cache.get(&"k".into()).await?, Some(json!({"a": 1})));
/// ```
#[async_trait]
pub trait Cache: Send + Sync + fmt::Debug {
    /// Identifier of the backend implementation ("memory", "redis", "sql").
    fn backend_name(&self) -> &'static str;

    /// Whether operations may proceed without an implicit connect.
    fn is_ready(&self) -> bool;

    /// Registers a new observer of lifecycle notifications.
    fn subscribe(&self) -> broadcast::Receiver<CacheEvent>;

    /// Acquires the underlying client handle. Idempotent.
    async fn connect(&self) -> Result<()>;

    /// Releases the underlying client handle. Idempotent.
    async fn disconnect(&self) -> Result<()>;

    /// Stores `value` under `key`, replacing any existing entry.
    async fn set(&self, key: &CacheKey, value: &Value, ttl: Option<u64>) -> Result<bool>;

    /// Returns the value if present and unexpired.
    async fn get(&self, key: &CacheKey) -> Result<Option<Value>>;

    /// Existence check, equivalent to `get(key)` being present.
    async fn includes(&self, key: &CacheKey) -> Result<bool>;

    /// Removes the entry, returning the number removed (0 or 1).
    async fn del(&self, key: &CacheKey) -> Result<usize>;

    /// Removes every entry.
    async fn clear(&self) -> Result<bool>;

    /// All unexpired keys.
    async fn keys(&self) -> Result<Vec<CacheKey>>;

    /// Bulk get. Absent keys are omitted from the result.
    async fn mget(&self, keys: &[CacheKey]) -> Result<HashMap<CacheKey, Value>>;

    /// Bulk delete, returning the number of entries actually removed.
    async fn mdel(&self, keys: &[CacheKey]) -> Result<usize>;

    /// Bulk set. Fails with a length mismatch before any write when
    /// `keys.len() != values.len()`.
    async fn mset(&self, keys: &[CacheKey], values: &[Value], ttl: Option<u64>) -> Result<bool>;

    /// Snapshot of all unexpired key/value pairs.
    async fn list(&self) -> Result<HashMap<CacheKey, Value>>;

    /// Refreshes the expiration of an existing entry without touching its value.
    async fn ttl(&self, key: &CacheKey, ttl: Option<u64>) -> Result<bool>;

    /// Remaining time-to-live in seconds, `None` when missing or expired.
    ///
    /// A live entry always reports at least one second. An entry found
    /// without any expiration (possible on the remote backend after a
    /// partially failed `mset`) is given the default TTL, which is returned.
    async fn get_ttl(&self, key: &CacheKey) -> Result<Option<u64>>;

    /// Returns the value and removes the entry in one step.
    async fn take(&self, key: &CacheKey) -> Result<Option<Value>>;
}
