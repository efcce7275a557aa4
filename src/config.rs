//! Configuration Module
//!
//! Per-backend configuration, read once when a backend is constructed.

use std::env;
use std::str::FromStr;

use crate::error::{CacheError, Result};

/// Default time-to-live in seconds applied when an operation omits one.
pub const DEFAULT_TTL: u64 = 300;

/// Default interval in seconds between relational expiry sweeps.
pub const DEFAULT_SQL_SWEEP_INTERVAL: u64 = 60;

/// Reads and parses an environment variable, ignoring unparsable values.
fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_string(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn check_ttl(default_ttl: u64) -> Result<()> {
    if default_ttl == 0 {
        return Err(CacheError::InvalidConfig(
            "default_ttl must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

// == Memory ==
/// Configuration for the in-process memory backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryConfig {
    /// Default TTL in seconds for entries without explicit TTL
    pub default_ttl: u64,
    /// Active expiry sweep interval in seconds, derived from the TTL when unset
    pub sweep_interval: Option<u64>,
}

impl MemoryConfig {
    /// Loads the memory configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DEFAULT_TTL` - Default TTL in seconds (default: 300)
    /// - `CACHE_SWEEP_INTERVAL` - Sweep frequency in seconds (default: the TTL)
    pub fn from_env() -> Self {
        Self {
            default_ttl: env_parse("CACHE_DEFAULT_TTL").unwrap_or(DEFAULT_TTL),
            sweep_interval: env_parse("CACHE_SWEEP_INTERVAL"),
        }
    }

    /// Effective sweep interval in seconds, never below one second.
    pub fn sweep_interval(&self) -> u64 {
        self.sweep_interval.unwrap_or(self.default_ttl).max(1)
    }

    pub fn validate(&self) -> Result<()> {
        check_ttl(self.default_ttl)?;
        if self.sweep_interval == Some(0) {
            return Err(CacheError::InvalidConfig(
                "sweep_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            sweep_interval: None,
        }
    }
}

// == Remote ==
/// Configuration for the remote key/value server backend.
///
/// Credentials are only used to build the connection URL and are not
/// retained by the backend afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// URL scheme, `redis` or `rediss`
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Logical database index
    pub database: i64,
    /// Default TTL in seconds for entries without explicit TTL
    pub default_ttl: u64,
}

impl RemoteConfig {
    /// Loads the remote configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `REDIS_SCHEME` - `redis` or `rediss` (default: redis)
    /// - `REDIS_HOST` - Server host (default: 127.0.0.1)
    /// - `REDIS_PORT` - Server port (default: 6379)
    /// - `REDIS_USERNAME` / `REDIS_PASSWORD` - Optional credentials
    /// - `REDIS_DB` - Database index (default: 0)
    /// - `CACHE_DEFAULT_TTL` - Default TTL in seconds (default: 300)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            scheme: env_string("REDIS_SCHEME").unwrap_or(defaults.scheme),
            host: env_string("REDIS_HOST").unwrap_or(defaults.host),
            port: env_parse("REDIS_PORT").unwrap_or(defaults.port),
            username: env_string("REDIS_USERNAME"),
            password: env_string("REDIS_PASSWORD"),
            database: env_parse("REDIS_DB").unwrap_or(defaults.database),
            default_ttl: env_parse("CACHE_DEFAULT_TTL").unwrap_or(defaults.default_ttl),
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_ttl(self.default_ttl)?;
        if self.host.is_empty() {
            return Err(CacheError::InvalidConfig("host must not be empty".to_string()));
        }
        if !matches!(self.scheme.as_str(), "redis" | "rediss") {
            return Err(CacheError::InvalidConfig(format!(
                "unsupported scheme: {}",
                self.scheme
            )));
        }
        if self.database < 0 {
            return Err(CacheError::InvalidConfig(
                "database index must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            scheme: "redis".to_string(),
            host: "127.0.0.1".to_string(),
            port: 6379,
            username: None,
            password: None,
            database: 0,
            default_ttl: DEFAULT_TTL,
        }
    }
}

// Credentials stay out of logs.
impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username.as_ref().map(|_| "***"))
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

// == Relational ==
/// Configuration for the relational (SQLite) backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlConfig {
    /// Database URL, e.g. `sqlite::memory:` or `sqlite://cache.db`
    pub url: String,
    /// Backing table name, escaped before use
    pub table: String,
    /// Default TTL in seconds for entries without explicit TTL
    pub default_ttl: u64,
    /// Interval in seconds between expiry sweeps
    pub sweep_interval: u64,
    /// Maximum pooled connections
    pub max_connections: u32,
}

impl SqlConfig {
    /// Loads the relational configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_SQL_URL` - Database URL (default: sqlite::memory:)
    /// - `CACHE_SQL_TABLE` - Table name (default: caches)
    /// - `CACHE_SQL_MAX_CONNECTIONS` - Pool size (default: 1)
    /// - `CACHE_DEFAULT_TTL` - Default TTL in seconds (default: 300)
    /// - `CACHE_SWEEP_INTERVAL` - Sweep frequency in seconds (default: 60)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: env_string("CACHE_SQL_URL").unwrap_or(defaults.url),
            table: env_string("CACHE_SQL_TABLE").unwrap_or(defaults.table),
            default_ttl: env_parse("CACHE_DEFAULT_TTL").unwrap_or(defaults.default_ttl),
            sweep_interval: env_parse("CACHE_SWEEP_INTERVAL").unwrap_or(defaults.sweep_interval),
            max_connections: env_parse("CACHE_SQL_MAX_CONNECTIONS")
                .unwrap_or(defaults.max_connections),
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_ttl(self.default_ttl)?;
        if self.table.is_empty() {
            return Err(CacheError::InvalidConfig("table must not be empty".to_string()));
        }
        if self.sweep_interval == 0 {
            return Err(CacheError::InvalidConfig(
                "sweep_interval must be greater than zero".to_string(),
            ));
        }
        if self.max_connections == 0 {
            return Err(CacheError::InvalidConfig(
                "max_connections must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            table: "caches".to_string(),
            default_ttl: DEFAULT_TTL,
            sweep_interval: DEFAULT_SQL_SWEEP_INTERVAL,
            max_connections: 1,
        }
    }
}
