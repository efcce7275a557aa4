//! Store Statistics Module
//!
//! Tracks read hits, misses and the current key count.

use serde::Serialize;

// == Store Stats ==
/// Tracks expiring map performance metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    /// Number of reads that found a live entry
    pub hits: u64,
    /// Number of reads that found nothing or an expired entry
    pub misses: u64,
    /// Current number of stored entries
    pub keys: usize,
}

impl StoreStats {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn set_keys(&mut self, count: usize) {
        self.keys = count;
    }

    /// Zeroes every counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
