//! Backends Module
//!
//! Concrete implementations of the cache contract.
//!
//! # Backends
//! - `memory`: process-local expiring map
//! - `redis`: remote Redis-protocol server
//! - `sql`: SQLite table with an expiry sweep

pub mod memory;
pub mod remote;
pub mod sql;

pub use memory::MemoryCache;
pub use remote::{build_connection_url, RemoteCache, RemoteOptions};
pub use sql::{quote_identifier, SqlCache};
