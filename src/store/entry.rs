//! Store Entry Module
//!
//! Defines the structure for individual stored entries with an absolute expiration.

use std::time::{SystemTime, UNIX_EPOCH};

// == Store Entry ==
/// Represents a single stored entry with its encoded value and expiration.
#[derive(Debug, Clone)]
pub struct StoreEntry {
    /// The encoded value
    pub value: String,
    /// Expiration timestamp (Unix milliseconds)
    pub expires_at: u64,
}

impl StoreEntry {
    // == Constructor ==
    /// Creates a new entry expiring `ttl_seconds` from now.
    pub fn new(value: String, ttl_seconds: u64) -> Self {
        Self {
            value,
            expires_at: expiry_from_now(ttl_seconds),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is considered expired when the current time is greater than
    /// or equal to the expiration time.
    pub fn is_expired(&self) -> bool {
        current_timestamp_ms() >= self.expires_at
    }

    /// Moves the expiration to `ttl_seconds` from now.
    pub fn refresh(&mut self, ttl_seconds: u64) {
        self.expires_at = expiry_from_now(ttl_seconds);
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, `0` once expired.
    pub fn ttl_remaining_ms(&self) -> u64 {
        self.expires_at.saturating_sub(current_timestamp_ms())
    }

    /// Returns remaining TTL in whole seconds, rounded up.
    ///
    /// Rounding up keeps a live entry strictly positive and never above
    /// the TTL it was stored with.
    pub fn ttl_remaining(&self) -> u64 {
        self.ttl_remaining_ms().div_ceil(1000)
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn expiry_from_now(ttl_seconds: u64) -> u64 {
    current_timestamp_ms().saturating_add(ttl_seconds.saturating_mul(1000))
}
