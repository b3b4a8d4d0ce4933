//! Veritas Resilience - request resilience layer for fact-checking providers
//!
//! Sits between the verification orchestrator and the outbound provider
//! clients (fact-check search, LLM classification, embeddings, vector
//! search): caches responses, enforces per-service admission windows,
//! retries transient failures and bounds latency with timeouts, chunked
//! fan-out and batching.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod limiter;
pub mod models;
pub mod persistence;
pub mod retry;
pub mod scheduler;
pub mod tasks;

pub use api::AppState;
pub use cache::{CacheStore, SharedCache};
pub use config::Config;
pub use error::{ResilienceError, Result, ServiceError};
pub use fingerprint::fingerprint;
pub use limiter::AdmissionLimiter;
pub use persistence::{FilePersistence, MemoryPersistence, PersistenceBackend};
pub use retry::{BackoffKind, RetryController, RetryObserver, RetryPolicy};
pub use scheduler::{
    operation, ParallelRequest, RequestContext, RequestKind, RequestOptions, RequestOutcome, RequestScheduler,
};
pub use tasks::spawn_cleanup_task;
