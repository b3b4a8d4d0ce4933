//! Flushing the cache to, and rehydrating it from, a persistence backend.

use tracing::{info, warn};

use crate::cache::{PersistedEntry, SharedCache};
use crate::error::{ResilienceError, Result};
use crate::persistence::PersistenceBackend;

/// Key under which the cache snapshot is stored.
pub const SNAPSHOT_KEY: &str = "response_cache.json";

/// Writes every live entry to `backend`. Returns the number written.
pub async fn flush_to(cache: &SharedCache, backend: &dyn PersistenceBackend) -> Result<usize> {
    let snapshot = cache.read().await.snapshot();
    let count = snapshot.len();
    let bytes = serde_json::to_vec(&snapshot)
        .map_err(|e| ResilienceError::Persistence(format!("encode snapshot: {}", e)))?;

    backend.set(SNAPSHOT_KEY, bytes).await?;
    info!(entries = count, "Cache flushed to persistence");
    Ok(count)
}

/// Loads a previously flushed snapshot into the cache.
///
/// A missing snapshot restores nothing. An unreadable one is logged and
/// ignored: the cache simply starts cold.
pub async fn rehydrate_from(cache: &SharedCache, backend: &dyn PersistenceBackend) -> Result<usize> {
    let Some(bytes) = backend.get(SNAPSHOT_KEY).await? else {
        return Ok(0);
    };

    let snapshot: Vec<PersistedEntry> = match serde_json::from_slice(&bytes) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(error = %e, "Ignoring unreadable cache snapshot");
            return Ok(0);
        }
    };

    let restored = cache.write().await.restore(snapshot);
    info!(entries = restored, "Cache rehydrated from persistence");
    Ok(restored)
}
