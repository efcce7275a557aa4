//! Polycache - a uniform TTL cache contract
//!
//! One async key/value contract with time-to-live semantics, implemented by
//! an in-process memory store, a Redis client and a SQL table.

pub mod backends;
pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod models;
pub mod store;
pub mod tasks;

pub use backends::{MemoryCache, RemoteCache, SqlCache};
pub use cache::Cache;
pub use config::{MemoryConfig, RemoteConfig, SqlConfig};
pub use error::{CacheError, Result};
pub use models::{CacheEvent, CacheKey};
