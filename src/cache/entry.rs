//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::Duration;

use tokio::time::Instant;

// == Cache Entry ==
/// A stored API result together with its bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Serialized payload, gzip-compressed when `compressed` is set
    pub payload: Vec<u8>,
    /// Whether `payload` holds compressed bytes
    pub compressed: bool,
    /// Insertion time
    pub created_at: Instant,
    /// Last successful lookup (or insertion)
    pub last_accessed_at: Instant,
    /// Number of hits served
    pub access_count: u64,
    /// Lifetime measured from `created_at`
    pub ttl: Duration,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry stamped with the current time.
    pub fn new(payload: Vec<u8>, compressed: bool, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            payload,
            compressed,
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            ttl,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// Boundary condition: an entry is visible only while
    /// `now - created_at < ttl`, so it is expired the instant the TTL has
    /// fully elapsed.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= self.ttl
    }

    // == Touch ==
    /// Records a hit.
    pub fn touch(&mut self) {
        self.last_accessed_at = Instant::now();
        self.access_count += 1;
    }

    // == Time To Live ==
    /// Returns remaining lifetime, zero once expired.
    pub fn ttl_remaining(&self) -> Duration {
        self.ttl
            .saturating_sub(Instant::now().saturating_duration_since(self.created_at))
    }

    /// Stored size in bytes.
    pub fn size_bytes(&self) -> usize {
        self.payload.len()
    }
}
