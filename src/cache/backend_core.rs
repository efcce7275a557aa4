//! Backend Core
//!
//! Composition helper held by every backend: resolved default TTL, key
//! validation, value codec and notification re-emission.

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::warn;

use crate::cache::{EVENT_CHANNEL_CAPACITY, MAX_KEY_LENGTH};
use crate::codec;
use crate::error::{CacheError, Result};
use crate::models::{CacheEvent, CacheKey};

/// State shared by delegation between a backend and its background tasks.
#[derive(Debug, Clone)]
pub struct BackendCore {
    name: &'static str,
    default_ttl: u64,
    events: broadcast::Sender<CacheEvent>,
}

impl BackendCore {
    // == Constructor ==
    /// Creates a core for the named backend with its resolved default TTL.
    pub fn new(name: &'static str, default_ttl: u64) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            name,
            default_ttl,
            events,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn default_ttl(&self) -> u64 {
        self.default_ttl
    }

    /// Uses the caller's TTL or falls back to the configured default.
    ///
    /// A TTL of zero is rejected before any backend I/O.
    pub fn resolve_ttl(&self, ttl: Option<u64>) -> Result<u64> {
        match ttl.unwrap_or(self.default_ttl) {
            0 => Err(CacheError::ZeroTtl),
            seconds => Ok(seconds),
        }
    }

    // == Validation ==
    /// Rejects keys whose encoded form exceeds the storage limit.
    pub fn validate_key(key: &CacheKey) -> Result<()> {
        if key.len() > MAX_KEY_LENGTH {
            return Err(CacheError::KeyTooLong {
                length: key.len(),
                max: MAX_KEY_LENGTH,
            });
        }
        Ok(())
    }

    /// Validates a bulk write before any mutation.
    pub fn validate_bulk(keys: &[CacheKey], values: &[Value]) -> Result<()> {
        if keys.len() != values.len() {
            return Err(CacheError::LengthMismatch {
                keys: keys.len(),
                values: values.len(),
            });
        }
        keys.iter().try_for_each(Self::validate_key)
    }

    // == Codec ==
    pub fn encode_value(value: &Value) -> Result<String> {
        codec::encode(value)
    }

    pub fn decode_value(encoded: &str) -> Result<Value> {
        codec::decode(encoded)
    }

    // == Notifications ==
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Sends an event to current subscribers. Having none is not an error.
    pub fn emit(&self, event: CacheEvent) {
        let _ = self.events.send(event);
    }

    pub fn emit_set(&self, key: &CacheKey, value: &Value) {
        self.emit(CacheEvent::Set {
            key: key.clone(),
            value: value.clone(),
        });
    }

    pub fn emit_del(&self, key: &CacheKey, value: Option<Value>) {
        self.emit(CacheEvent::Del {
            key: key.clone(),
            value,
        });
    }

    pub fn emit_error(&self, operation: &'static str, err: &CacheError) {
        self.emit(CacheEvent::Error {
            operation,
            message: err.to_string(),
        });
    }

    // == Best-effort Surface ==
    /// Converts a transient failure into the falsy default of `T`.
    ///
    /// Validation errors pass through untouched. Any other cause is logged
    /// and re-emitted as an error notification.
    pub fn settle<T: Default>(&self, operation: &'static str, outcome: Result<T>) -> Result<T> {
        match outcome {
            Ok(value) => Ok(value),
            Err(err) if err.is_validation() => Err(err),
            Err(err) => {
                warn!(backend = self.name, operation, error = %err, "cache operation failed");
                self.emit_error(operation, &err);
                Ok(T::default())
            }
        }
    }
}
