//! Error types for the cache backends
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for every cache backend.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Encoded key is longer than the storage column allows
    #[error("Key too long: encoded key is {length} bytes, maximum is {max}")]
    KeyTooLong { length: usize, max: usize },

    /// Bulk operation received a different number of keys and values
    #[error("Length mismatch: {keys} keys but {values} values")]
    LengthMismatch { keys: usize, values: usize },

    /// A zero TTL would expire the entry before it could be read
    #[error("Invalid TTL: must be at least one second")]
    ZeroTtl,

    /// Key or value could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Remote store command or connection failure
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// SQL statement or pool failure
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    /// Connection URL could not be built
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration rejected at construction time
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CacheError {
    /// Returns true for errors that are fatal to the call and must reach the caller.
    ///
    /// Everything else is a transient backend failure that mutations report
    /// as a falsy result.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CacheError::KeyTooLong { .. }
                | CacheError::LengthMismatch { .. }
                | CacheError::ZeroTtl
        )
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
