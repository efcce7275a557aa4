//! Data models shared by every backend
//!
//! Defines the encoded cache key and the lifecycle notifications.

pub mod event;
pub mod key;

pub use event::CacheEvent;
pub use key::CacheKey;
