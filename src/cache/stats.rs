//! Response cache counters, reported through `/stats` and `/report`.

use serde::Serialize;

/// Lifetime counters plus a point-in-time size snapshot.
///
/// The counters are maintained by the store as operations happen; the size
/// fields are filled in by [`CacheStore::stats`](super::CacheStore::stats).
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    /// Lookups that found nothing usable: absent, expired or unreadable
    pub misses: u64,
    /// Entries dropped to make room for a new key
    pub evictions: u64,
    pub expirations: u64,
    /// Entries discarded because their payload no longer decodes
    pub decode_failures: u64,
    pub total_entries: usize,
    /// Configured maximum entry count
    pub capacity: usize,
    pub compressed_entries: usize,
    /// Payload bytes as stored, after compression
    pub total_bytes: usize,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share of lookups answered from the cache; 0.0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        match self.lookups() {
            0 => 0.0,
            lookups => self.hits as f64 / lookups as f64,
        }
    }

    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }

    /// Fraction of capacity in use.
    pub fn fill_ratio(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.total_entries as f64 / self.capacity as f64
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn record_expiration(&mut self) {
        self.expirations += 1;
    }

    pub fn record_decode_failure(&mut self) {
        self.decode_failures += 1;
    }
}
