//! Configuration Module
//!
//! Handles loading and managing resilience-layer configuration from
//! environment variables.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ResilienceError, Result};
use crate::retry::{BackoffKind, RetryPolicy};

// == Service Names ==
/// Fact-check claim search provider
pub const FACT_CHECK: &str = "fact_check";
/// LLM classification provider
pub const LLM: &str = "llm";
/// Embedding generation provider
pub const EMBEDDING: &str = "embedding";
/// Vector similarity search provider
pub const VECTOR_SEARCH: &str = "vector_search";

/// Services that receive a rate window by default.
pub const DEFAULT_SERVICES: [&str; 4] = [FACT_CHECK, LLM, EMBEDDING, VECTOR_SEARCH];

// == Service Limit ==
/// Admission window for one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceLimit {
    /// Requests allowed within one window
    pub limit: u32,
    /// Rolling window length in milliseconds
    pub window_ms: u64,
}

impl ServiceLimit {
    pub fn new(limit: u32, window_ms: u64) -> Self {
        Self { limit, window_ms }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Parses the `"<limit>/<window_ms>"` form used by `RATE_LIMIT_*` variables.
    pub fn parse(raw: &str) -> Option<Self> {
        let (limit, window) = raw.trim().split_once('/')?;
        Some(Self {
            limit: limit.trim().parse().ok()?,
            window_ms: window.trim().parse().ok()?,
        })
    }

    fn default_for(service: &str) -> Self {
        match service {
            FACT_CHECK => Self::new(60, 60_000),
            LLM => Self::new(20, 60_000),
            _ => Self::new(100, 60_000),
        }
    }
}

// == Cache Config ==
/// Cache Store parameters.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries the cache can hold
    pub max_size: usize,
    /// TTL applied when `set` is called without one
    pub default_ttl: Duration,
    /// Serialized payload size in bytes above which compression is attempted
    pub compression_threshold: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            default_ttl: Duration::from_millis(86_400_000),
            compression_threshold: 1000,
        }
    }
}

// == Scheduler Config ==
/// Request Scheduler parameters.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Latency target the configured percentile is compared against
    pub max_response_time: Duration,
    /// Percentile (1-100) checked by `is_within_target`
    pub target_percentile: u8,
    /// Timeout applied when a request does not carry its own
    pub request_timeout: Duration,
    /// Chunk size for parallel fan-out and flush threshold for batching
    pub batch_size: usize,
    /// Longest a partial batch waits before it is flushed
    pub batch_max_wait: Duration,
    /// When false, items within a chunk run one after another
    pub enable_parallel_processing: bool,
    /// Policy applied by `process_request`
    pub retry_policy: RetryPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_response_time: Duration::from_millis(3000),
            target_percentile: 95,
            request_timeout: Duration::from_millis(10_000),
            batch_size: 5,
            batch_max_wait: Duration::from_millis(50),
            enable_parallel_processing: true,
            retry_policy: RetryPolicy::new(
                3,
                Duration::from_millis(1000),
                BackoffKind::Exponential,
                Duration::from_millis(10_000),
            ),
        }
    }
}

/// Resilience-layer configuration.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub cache: CacheConfig,
    pub scheduler: SchedulerConfig,
    /// Per-service admission windows
    pub service_limits: HashMap<String, ServiceLimit>,
    /// Background expiry sweep interval in seconds
    pub cleanup_interval: u64,
    /// Admin HTTP server port
    pub server_port: u16,
    /// Directory for durable cache snapshots, disabled when None
    pub persistence_dir: Option<PathBuf>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_RESPONSE_TIME_MS` - Latency target (default: 3000)
    /// - `TARGET_PERCENTILE` - Percentile compared with the target (default: 95)
    /// - `REQUEST_TIMEOUT_MS` - Default per-request timeout (default: 10000)
    /// - `BATCH_SIZE` - Chunk and batch size (default: 5)
    /// - `BATCH_MAX_WAIT_MS` - Partial batch flush delay (default: 50)
    /// - `ENABLE_PARALLEL_PROCESSING` - Run chunk items concurrently (default: true)
    /// - `CACHE_MAX_SIZE` - Maximum cache entries (default: 1000)
    /// - `CACHE_DEFAULT_TTL_MS` - Default TTL (default: 86400000)
    /// - `CACHE_COMPRESSION_THRESHOLD` - Compression threshold in bytes (default: 1000)
    /// - `CLEANUP_INTERVAL_SECS` - Expiry sweep frequency (default: 60)
    /// - `SERVER_PORT` - Admin HTTP port (default: 3000)
    /// - `PERSISTENCE_DIR` - Cache snapshot directory (default: unset)
    /// - `RATE_LIMIT_<SERVICE>` - `"<limit>/<window_ms>"` per service
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let mut service_limits = defaults.service_limits;
        for (name, value) in env::vars() {
            if let Some(service) = name.strip_prefix("RATE_LIMIT_") {
                match ServiceLimit::parse(&value) {
                    Some(limit) => {
                        service_limits.insert(service.to_lowercase(), limit);
                    }
                    None => tracing::warn!(variable = %name, value = %value, "Ignoring malformed rate limit"),
                }
            }
        }

        Self {
            cache: CacheConfig {
                max_size: env_or("CACHE_MAX_SIZE", defaults.cache.max_size),
                default_ttl: Duration::from_millis(env_or(
                    "CACHE_DEFAULT_TTL_MS",
                    defaults.cache.default_ttl.as_millis() as u64,
                )),
                compression_threshold: env_or(
                    "CACHE_COMPRESSION_THRESHOLD",
                    defaults.cache.compression_threshold,
                ),
            },
            scheduler: SchedulerConfig {
                max_response_time: Duration::from_millis(env_or(
                    "MAX_RESPONSE_TIME_MS",
                    defaults.scheduler.max_response_time.as_millis() as u64,
                )),
                target_percentile: env_or("TARGET_PERCENTILE", defaults.scheduler.target_percentile),
                request_timeout: Duration::from_millis(env_or(
                    "REQUEST_TIMEOUT_MS",
                    defaults.scheduler.request_timeout.as_millis() as u64,
                )),
                batch_size: env_or("BATCH_SIZE", defaults.scheduler.batch_size),
                batch_max_wait: Duration::from_millis(env_or(
                    "BATCH_MAX_WAIT_MS",
                    defaults.scheduler.batch_max_wait.as_millis() as u64,
                )),
                enable_parallel_processing: env_or(
                    "ENABLE_PARALLEL_PROCESSING",
                    defaults.scheduler.enable_parallel_processing,
                ),
                retry_policy: defaults.scheduler.retry_policy,
            },
            service_limits,
            cleanup_interval: env_or("CLEANUP_INTERVAL_SECS", defaults.cleanup_interval),
            server_port: env_or("SERVER_PORT", defaults.server_port),
            persistence_dir: env::var("PERSISTENCE_DIR").ok().map(PathBuf::from),
        }
    }

    // == Validate ==
    /// Rejects values the components cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.cache.max_size == 0 {
            return Err(ResilienceError::Config("CACHE_MAX_SIZE must be at least 1".to_string()));
        }
        if self.scheduler.batch_size == 0 {
            return Err(ResilienceError::Config("BATCH_SIZE must be at least 1".to_string()));
        }
        if !(1..=100).contains(&self.scheduler.target_percentile) {
            return Err(ResilienceError::Config(
                "TARGET_PERCENTILE must be between 1 and 100".to_string(),
            ));
        }
        if let Some((service, _)) = self.service_limits.iter().find(|(_, l)| l.window_ms == 0) {
            return Err(ResilienceError::Config(format!(
                "rate window for '{}' must be positive",
                service
            )));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            scheduler: SchedulerConfig::default(),
            service_limits: DEFAULT_SERVICES
                .iter()
                .map(|s| (s.to_string(), ServiceLimit::default_for(s)))
                .collect(),
            cleanup_interval: 60,
            server_port: 3000,
            persistence_dir: None,
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
