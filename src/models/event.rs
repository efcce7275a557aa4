//! Cache lifecycle notifications
//!
//! Events are emitted by a backend only after the underlying write has
//! succeeded. They are observation-only: nothing inside a backend waits
//! for a subscriber.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::models::CacheKey;

/// A notification emitted by a backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum CacheEvent {
    /// Underlying client handle became ready
    Connect,
    /// Underlying client handle was released
    Disconnect,
    /// Connection was lost; the next operation reconnects
    Reconnecting,
    /// A backend failure that was converted to a falsy result
    Error {
        operation: &'static str,
        message: String,
    },
    /// Entry stored
    Set { key: CacheKey, value: Value },
    /// Entry removed; the previous value when the backend read it first
    Del { key: CacheKey, value: Option<Value> },
    /// All entries removed
    Flush,
    /// Background sweep physically removed expired entries
    Expired { count: usize },
}

impl CacheEvent {
    /// Short event name, matching the notification channel names.
    pub fn name(&self) -> &'static str {
        match self {
            CacheEvent::Connect => "connect",
            CacheEvent::Disconnect => "disconnect",
            CacheEvent::Reconnecting => "reconnecting",
            CacheEvent::Error { .. } => "error",
            CacheEvent::Set { .. } => "set",
            CacheEvent::Del { .. } => "del",
            CacheEvent::Flush => "flush",
            CacheEvent::Expired { .. } => "expired",
        }
    }
}

impl fmt::Display for CacheEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheEvent::Error { operation, message } => {
                write!(f, "error during {}: {}", operation, message)
            }
            CacheEvent::Set { key, .. } | CacheEvent::Del { key, .. } => {
                write!(f, "{} {}", self.name(), key)
            }
            CacheEvent::Expired { count } => write!(f, "expired {} entries", count),
            _ => f.write_str(self.name()),
        }
    }
}
