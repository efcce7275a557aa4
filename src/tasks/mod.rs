//! Background Tasks Module
//!
//! Contains background tasks that run periodically for the lifetime of a
//! backend connection.
//!
//! # Tasks
//! - Expiry sweep: physically removes expired entries at configured intervals

mod sweep;

pub use sweep::{spawn_sweep_task, Sweep};
