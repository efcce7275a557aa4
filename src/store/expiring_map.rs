//! Expiring Map Module
//!
//! Process-local key/value map with per-entry expiration. Expired entries
//! are dropped passively on access and actively by [`ExpiringMap::cleanup_expired`].

use std::collections::HashMap;

use crate::store::{StoreEntry, StoreStats};

// == Expiring Map ==
/// Encoded key to encoded value storage with TTL support.
#[derive(Debug, Default)]
pub struct ExpiringMap {
    /// Key-value storage
    entries: HashMap<String, StoreEntry>,
    /// Read statistics
    stats: StoreStats,
}

impl ExpiringMap {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    // == Set ==
    /// Stores a key-value pair expiring `ttl` seconds from now.
    ///
    /// If the key already exists, the value is overwritten and TTL is reset.
    pub fn set(&mut self, key: String, value: String, ttl: u64) {
        self.entries.insert(key, StoreEntry::new(value, ttl));
        self.stats.set_keys(self.entries.len());
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Expired entries are removed and counted as misses.
    pub fn get(&mut self, key: &str) -> Option<String> {
        match self.live(key) {
            Some(entry) => {
                let value = entry.value.clone();
                self.stats.record_hit();
                Some(value)
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// Existence check that does not touch hit/miss counters.
    pub fn contains(&mut self, key: &str) -> bool {
        self.live(key).is_some()
    }

    // == Delete ==
    /// Removes an entry, returning its value if it was still live.
    pub fn delete(&mut self, key: &str) -> Option<String> {
        let removed = self.entries.remove(key);
        self.stats.set_keys(self.entries.len());
        removed.filter(|entry| !entry.is_expired()).map(|entry| entry.value)
    }

    // == Take ==
    /// Removes and returns a live entry's value, counting the read.
    pub fn take(&mut self, key: &str) -> Option<String> {
        let value = self.delete(key);
        if value.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        value
    }

    // == TTL ==
    /// Resets the expiration of a live entry. Returns false if absent.
    pub fn refresh(&mut self, key: &str, ttl: u64) -> bool {
        match self.live_mut(key) {
            Some(entry) => {
                entry.refresh(ttl);
                true
            }
            None => false,
        }
    }

    /// Remaining TTL in seconds of a live entry.
    pub fn ttl_remaining(&mut self, key: &str) -> Option<u64> {
        self.live(key).map(StoreEntry::ttl_remaining)
    }

    // == Enumeration ==
    /// All live keys in encoded order.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// All live key/value pairs.
    pub fn entries(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired())
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }

    // == Flush ==
    /// Removes every entry and resets statistics. Returns the number removed.
    pub fn flush(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.stats.reset();
        count
    }

    // == Stats ==
    /// Returns current statistics.
    pub fn stats(&self) -> StoreStats {
        let mut stats = self.stats.clone();
        stats.set_keys(self.entries.len());
        stats
    }

    // == Cleanup Expired ==
    /// Removes all expired entries.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        self.stats.set_keys(self.entries.len());
        before - self.entries.len()
    }

    // == Length ==
    /// Returns the number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a live entry, dropping it if it has expired.
    fn live(&mut self, key: &str) -> Option<&StoreEntry> {
        self.live_mut(key).map(|entry| &*entry)
    }

    fn live_mut(&mut self, key: &str) -> Option<&mut StoreEntry> {
        if self.entries.get(key).is_some_and(StoreEntry::is_expired) {
            self.entries.remove(key);
            self.stats.set_keys(self.entries.len());
            return None;
        }
        self.entries.get_mut(key)
    }
}
