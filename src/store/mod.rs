//! Store Module
//!
//! Process-local expiring map used by the memory backend.

mod entry;
mod expiring_map;
mod stats;


// Re-export public types
pub use entry::{current_timestamp_ms, StoreEntry};
pub use expiring_map::ExpiringMap;
pub use stats::StoreStats;
