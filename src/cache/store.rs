//! Cache Store Module
//!
//! Main cache engine combining HashMap storage with LRU tracking, TTL
//! expiration and transparent payload compression.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cache::codec;
use crate::cache::{CacheEntry, CacheStats, LruTracker, MAX_KEY_LENGTH};
use crate::config::CacheConfig;
use crate::error::{ResilienceError, Result};

// == Persisted Entry ==
/// Durable form of a live entry; TTL is stored as the remaining lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEntry {
    pub key: String,
    pub payload: Vec<u8>,
    pub compressed: bool,
    pub ttl_remaining_ms: u64,
    pub access_count: u64,
}

// == Cache Store ==
/// Main cache storage with LRU eviction and TTL support.
#[derive(Debug)]
pub struct CacheStore {
    /// Key-value storage
    entries: HashMap<String, CacheEntry>,
    /// LRU access tracker
    lru: LruTracker,
    /// Performance statistics
    stats: CacheStats,
    /// Maximum number of entries allowed
    max_size: usize,
    /// TTL for entries without explicit TTL
    default_ttl: Duration,
    /// Serialized size above which compression is attempted
    compression_threshold: usize,
}

impl CacheStore {
    // == Constructor ==
    /// Creates a new CacheStore.
    ///
    /// # Arguments
    /// * `max_size` - Maximum number of entries the cache can hold
    /// * `default_ttl` - TTL for entries stored without an explicit one
    /// * `compression_threshold` - Payload bytes above which compression is tried
    pub fn new(max_size: usize, default_ttl: Duration, compression_threshold: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: CacheStats::new(),
            max_size,
            default_ttl,
            compression_threshold,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            config.max_size,
            config.default_ttl,
            config.compression_threshold,
        )
    }

    // == Set ==
    /// Stores a value with optional TTL.
    ///
    /// If the key already exists, the value is overwritten and TTL is reset.
    /// If the cache is at capacity, the least recently used entry is evicted
    /// before the new one is inserted.
    pub fn set(&mut self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<()> {
        if key.is_empty() {
            return Err(ResilienceError::Validation("cache key cannot be empty".to_string()));
        }
        if key.len() > MAX_KEY_LENGTH {
            return Err(ResilienceError::Validation(format!(
                "cache key exceeds maximum length of {} bytes",
                MAX_KEY_LENGTH
            )));
        }

        let encoded = codec::encode(value, self.compression_threshold)?;

        let is_overwrite = self.entries.contains_key(key);
        if !is_overwrite && self.entries.len() >= self.max_size {
            match self.lru.evict_oldest() {
                Some(evicted) => {
                    self.entries.remove(&evicted);
                    self.stats.record_eviction();
                    debug!(key = %evicted, "Evicted least recently used cache entry");
                }
                None => {
                    return Err(ResilienceError::Cache(
                        "cache is full and eviction failed".to_string(),
                    ));
                }
            }
        }

        let entry = CacheEntry::new(
            encoded.bytes,
            encoded.compressed,
            ttl.unwrap_or(self.default_ttl),
        );
        self.entries.insert(key.to_string(), entry);
        self.lru.touch(key);

        Ok(())
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Expired entries are removed and reported as absent. An entry whose
    /// payload cannot be decoded is dropped and also reported as absent.
    pub fn get(&mut self, key: &str) -> Option<Value> {
        let Some(entry) = self.entries.get_mut(key) else {
            self.stats.record_miss();
            return None;
        };

        if entry.is_expired() {
            self.remove_entry(key);
            self.stats.record_expiration();
            self.stats.record_miss();
            debug!(key = %key, "Cache entry expired on read");
            return None;
        }

        match codec::decode(&entry.payload, entry.compressed) {
            Ok(value) => {
                entry.touch();
                self.lru.touch(key);
                self.stats.record_hit();
                Some(value)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding unreadable cache entry");
                self.remove_entry(key);
                self.stats.record_decode_failure();
                self.stats.record_miss();
                None
            }
        }
    }

    // == Delete ==
    /// Removes an entry by key; returns whether it existed.
    pub fn delete(&mut self, key: &str) -> bool {
        self.remove_entry(key)
    }

    // == Clear ==
    /// Removes every entry. Statistics counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru.clear();
    }

    /// Read-only access to an entry's metadata, without touching it.
    pub fn entry(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.total_entries = self.entries.len();
        stats.capacity = self.max_size;
        stats.compressed_entries = self.entries.values().filter(|e| e.compressed).count();
        stats.total_bytes = self.entries.values().map(CacheEntry::size_bytes).sum();
        stats
    }

    // == Cleanup Expired ==
    /// Removes all expired entries from the cache.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.remove_entry(key);
            self.stats.record_expiration();
        }

        expired.len()
    }

    // == Snapshot ==
    /// Captures every live entry, least recently used first.
    pub fn snapshot(&self) -> Vec<PersistedEntry> {
        let mut live: Vec<(&String, &CacheEntry)> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired())
            .collect();
        live.sort_by_key(|(_, entry)| entry.last_accessed_at);

        live.into_iter()
            .map(|(key, entry)| PersistedEntry {
                key: key.clone(),
                payload: entry.payload.clone(),
                compressed: entry.compressed,
                ttl_remaining_ms: entry.ttl_remaining().as_millis() as u64,
                access_count: entry.access_count,
            })
            .collect()
    }

    // == Restore ==
    /// Re-inserts persisted entries, oldest first, so that recency order
    /// survives the round trip. Returns the number restored.
    pub fn restore(&mut self, snapshot: Vec<PersistedEntry>) -> usize {
        let mut restored = 0;
        for persisted in snapshot {
            if persisted.ttl_remaining_ms == 0 || persisted.key.is_empty() {
                continue;
            }
            if !self.entries.contains_key(&persisted.key) && self.entries.len() >= self.max_size {
                if let Some(evicted) = self.lru.evict_oldest() {
                    self.entries.remove(&evicted);
                    self.stats.record_eviction();
                }
            }
            let mut entry = CacheEntry::new(
                persisted.payload,
                persisted.compressed,
                Duration::from_millis(persisted.ttl_remaining_ms),
            );
            entry.access_count = persisted.access_count;
            self.lru.touch(&persisted.key);
            self.entries.insert(persisted.key, entry);
            restored += 1;
        }
        restored
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn remove_entry(&mut self, key: &str) -> bool {
        let existed = self.entries.remove(key).is_some();
        if existed {
            self.lru.remove(key);
        }
        existed
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TTL: Duration = Duration::from_secs(300);

    fn store(max_size: usize) -> CacheStore {
        CacheStore::new(max_size, TTL, 1000)
    }

    #[test]
    fn test_store_new() {
        let store = store(100);
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
        assert_eq!(store.stats().capacity, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_set_and_get() {
        let mut store = store(100);

        store.set("key1", &json!({"verdict": "false"}), None).unwrap();
        assert_eq!(store.get("key1"), Some(json!({"verdict": "false"})));
        assert_eq!(store.len(), 1);
        assert_eq!(store.entry("key1").unwrap().access_count, 1);
    }

    #[test]
    fn test_store_get_nonexistent() {
        let mut store = store(100);
        assert_eq!(store.get("nonexistent"), None);
        assert_eq!(store.stats().misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_delete_and_clear() {
        let mut store = store(100);

        store.set("key1", &json!(1), None).unwrap();
        store.set("key2", &json!(2), None).unwrap();
        assert!(store.delete("key1"));
        assert!(!store.delete("key1"));
        assert_eq!(store.get("key1"), None);

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.get("key2"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_overwrite() {
        let mut store = store(100);

        store.set("key1", &json!("value1"), None).unwrap();
        store.set("key1", &json!("value2"), None).unwrap();

        assert_eq!(store.get("key1"), Some(json!("value2")));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_ttl_expiration_removes_entry() {
        let mut store = store(100);

        store
            .set("key1", &json!("value1"), Some(Duration::from_millis(1000)))
            .unwrap();
        assert!(store.get("key1").is_some());

        tokio::time::advance(Duration::from_millis(1000)).await;

        assert_eq!(store.get("key1"), None);
        assert_eq!(store.len(), 0, "Expired entry should be removed on read");
        assert_eq!(store.stats().expirations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_lru_eviction() {
        let mut store = store(3);

        store.set("key1", &json!(1), None).unwrap();
        store.set("key2", &json!(2), None).unwrap();
        store.set("key3", &json!(3), None).unwrap();
        store.set("key4", &json!(4), None).unwrap();

        assert_eq!(store.len(), 3);
        assert_eq!(store.get("key1"), None);
        assert!(store.get("key2").is_some());
        assert!(store.get("key4").is_some());
        assert_eq!(store.stats().evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_lru_touch_on_get() {
        let mut store = store(3);

        store.set("key1", &json!(1), None).unwrap();
        store.set("key2", &json!(2), None).unwrap();
        store.set("key3", &json!(3), None).unwrap();

        store.get("key1").unwrap();
        store.set("key4", &json!(4), None).unwrap();

        assert!(store.get("key1").is_some());
        assert_eq!(store.get("key2"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_compresses_large_payloads() {
        let mut store = store(10);
        let large = json!({"evidence": "repeated claim text ".repeat(100)});

        store.set("small", &json!("tiny"), None).unwrap();
        store.set("large", &large, None).unwrap();

        assert!(!store.entry("small").unwrap().compressed);
        assert!(store.entry("large").unwrap().compressed);
        assert_eq!(store.get("large"), Some(large));
        assert_eq!(store.stats().compressed_entries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_corrupt_entry_is_treated_as_miss() {
        let mut store = store(10);
        store.set("key", &json!("value"), None).unwrap();
        store.entries.get_mut("key").unwrap().payload = b"\x1f\x8bgarbage".to_vec();
        store.entries.get_mut("key").unwrap().compressed = true;

        assert_eq!(store.get("key"), None);
        assert!(store.is_empty());
        assert_eq!(store.stats().decode_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_cleanup_expired() {
        let mut store = store(100);

        store.set("key1", &json!(1), Some(Duration::from_secs(1))).unwrap();
        store.set("key2", &json!(2), Some(Duration::from_secs(10))).unwrap();

        tokio::time::advance(Duration::from_millis(1100)).await;

        assert_eq!(store.cleanup_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get("key2").is_some());
    }

    #[test]
    fn test_store_key_validation() {
        let mut store = store(100);
        let long_key = "x".repeat(MAX_KEY_LENGTH + 1);

        assert!(matches!(
            store.set(&long_key, &json!(1), None),
            Err(ResilienceError::Validation(_))
        ));
        assert!(matches!(
            store.set("", &json!(1), None),
            Err(ResilienceError::Validation(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_and_restore_preserve_recency() {
        let mut source = store(3);
        source.set("a", &json!("A"), None).unwrap();
        tokio::time::advance(Duration::from_millis(5)).await;
        source.set("b", &json!("B"), None).unwrap();
        tokio::time::advance(Duration::from_millis(5)).await;
        source.get("a").unwrap();
        tokio::time::advance(Duration::from_secs(100)).await;

        let snapshot = source.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].key, "b");
        assert!(snapshot[1].ttl_remaining_ms <= 200_000);

        let mut target = store(3);
        assert_eq!(target.restore(snapshot), 2);
        target.set("c", &json!("C"), None).unwrap();
        target.set("d", &json!("D"), None).unwrap();

        // "b" was least recently used in the source and is evicted first
        assert_eq!(target.get("b"), None);
        assert_eq!(target.get("a"), Some(json!("A")));
    }
}
