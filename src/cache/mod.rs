//! Cache Module
//!
//! Provides in-memory caching of API results with TTL expiration, LRU
//! eviction, payload compression and optional durable snapshots.

pub mod codec;
mod entry;
mod lru;
mod persist;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

use std::sync::Arc;

use tokio::sync::RwLock;

// Re-export public types
pub use entry::CacheEntry;
pub use lru::LruTracker;
pub use persist::{flush_to, rehydrate_from, SNAPSHOT_KEY};
pub use stats::CacheStats;
pub use store::{CacheStore, PersistedEntry};

/// Cache store shared between the scheduler, the sweep task and the admin API.
pub type SharedCache = Arc<RwLock<CacheStore>>;

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;
