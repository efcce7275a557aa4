//! Cache key model
//!
//! Keys are arbitrary structured values canonicalized through the codec.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec;
use crate::error::Result;

/// A cache key held in its canonical encoded form.
///
/// Ordering and equality follow the encoded string, which is also the
/// order the relational backend returns keys in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Builds a key from any serializable value.
    pub fn new<T: Serialize + ?Sized>(key: &T) -> Result<Self> {
        Ok(Self(codec::encode(key)?))
    }

    /// Wraps a string that is already in encoded form, as read back from storage.
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// The encoded form used as the storage key.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length of the encoded form in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decodes the key back into its structured value.
    pub fn value(&self) -> Result<Value> {
        codec::decode(&self.0)
    }
}

impl From<Value> for CacheKey {
    fn from(value: Value) -> Self {
        Self(codec::canonicalize(value).to_string())
    }
}

impl From<&Value> for CacheKey {
    fn from(value: &Value) -> Self {
        Self::from(value.clone())
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self(Value::from(key).to_string())
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        Self(Value::String(key).to_string())
    }
}

impl From<i64> for CacheKey {
    fn from(key: i64) -> Self {
        Self(key.to_string())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
