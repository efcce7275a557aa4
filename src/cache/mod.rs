//! Cache Module
//!
//! The Cache Contract and the helper every backend composes.

mod contract;
mod backend_core;

pub use self::contract::Cache;
pub use self::backend_core::BackendCore;

// == Public Constants ==
/// Maximum allowed encoded key length in bytes
pub const MAX_KEY_LENGTH: usize = 255;

/// Buffered notifications per subscriber before the slowest one lags
pub const EVENT_CHANNEL_CAPACITY: usize = 256;
