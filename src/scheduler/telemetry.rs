//! Response-time telemetry and performance reporting.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::cache::CacheStats;
use crate::error::ResilienceError;

/// Samples kept in the ring buffer
pub const SAMPLE_CAPACITY: usize = 1000;

// == Response Time Stats ==
/// Ring buffer of recent response times in milliseconds.
///
/// Aggregates are computed on read from a sorted copy.
#[derive(Debug, Clone)]
pub struct ResponseTimeStats {
    samples: VecDeque<u64>,
    capacity: usize,
    total_recorded: u64,
}

/// Aggregates over the current samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    pub count: usize,
    pub avg_ms: f64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
    pub max_ms: u64,
}

impl ResponseTimeStats {
    pub fn new() -> Self {
        Self::with_capacity(SAMPLE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            total_recorded: 0,
        }
    }

    /// Appends a sample, evicting the oldest once the buffer is full.
    pub fn record(&mut self, ms: u64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(ms);
        self.total_recorded += 1;
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples recorded since creation, including evicted ones.
    pub fn total_recorded(&self) -> u64 {
        self.total_recorded
    }

    /// Nearest-rank percentile, None without samples.
    pub fn percentile(&self, p: f64) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }
        let sorted = self.sorted();
        Some(nearest_rank(&sorted, p))
    }

    pub fn summary(&self) -> LatencySummary {
        if self.samples.is_empty() {
            return LatencySummary::default();
        }
        let sorted = self.sorted();
        let sum: u128 = sorted.iter().map(|&ms| u128::from(ms)).sum();

        LatencySummary {
            count: sorted.len(),
            avg_ms: sum as f64 / sorted.len() as f64,
            p50_ms: nearest_rank(&sorted, 50.0),
            p95_ms: nearest_rank(&sorted, 95.0),
            p99_ms: nearest_rank(&sorted, 99.0),
            max_ms: sorted[sorted.len() - 1],
        }
    }

    fn sorted(&self) -> Vec<u64> {
        let mut sorted: Vec<u64> = self.samples.iter().copied().collect();
        sorted.sort_unstable();
        sorted
    }
}

impl Default for ResponseTimeStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Nearest-rank percentile of a non-empty ascending slice: the value at
/// rank `ceil(p/100 * n)`.
pub fn nearest_rank(sorted: &[u64], p: f64) -> u64 {
    let n = sorted.len();
    let rank = ((p / 100.0) * n as f64).ceil() as usize;
    sorted[rank.clamp(1, n) - 1]
}

// == Scheduler Counters ==
/// Monotonic request counters.
#[derive(Debug, Default)]
pub struct SchedulerCounters {
    pub total_requests: AtomicU64,
    pub successes: AtomicU64,
    pub failures: AtomicU64,
    pub cache_hits: AtomicU64,
    pub timeouts: AtomicU64,
    pub rate_limited: AtomicU64,
    pub validation_failures: AtomicU64,
    pub retries: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub total_requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub cache_hits: u64,
    pub timeouts: u64,
    pub rate_limited: u64,
    pub validation_failures: u64,
    pub retries: u64,
}

impl SchedulerCounters {
    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, from_cache: bool) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        if from_cache {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_retries(&self, retries: u32) {
        self.retries.fetch_add(u64::from(retries), Ordering::Relaxed);
    }

    pub fn record_failure(&self, error: &ResilienceError) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        let counter = match error {
            ResilienceError::Timeout { .. } => &self.timeouts,
            ResilienceError::RateLimitExceeded { .. } => &self.rate_limited,
            ResilienceError::Validation(_) => &self.validation_failures,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

// == Stats and Report ==
/// Point-in-time view of the scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStats {
    pub latency: LatencySummary,
    pub counters: CounterSnapshot,
    pub cache: CacheStats,
    pub pending_batch: usize,
    pub batch_size: usize,
    pub max_response_time_ms: u64,
    pub target_percentile: u8,
    /// Latency at `target_percentile`
    pub target_percentile_ms: u64,
    pub within_target: bool,
}

/// Stats plus advisory recommendations.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub generated_at: String,
    pub stats: SchedulerStats,
    pub recommendations: Vec<String>,
}

/// Minimum traffic before ratio-based advice is given
const MIN_SAMPLE_FOR_RATIOS: u64 = 20;

/// Advice for every breached threshold; empty when all is well.
pub fn recommendations(stats: &SchedulerStats) -> Vec<String> {
    let mut advice = Vec::new();
    let target = stats.max_response_time_ms;

    if !stats.within_target {
        advice.push(format!(
            "Latency p{} ({}ms) above target ({}ms): lower per-request timeouts or enable parallel processing",
            stats.target_percentile, stats.target_percentile_ms, target
        ));
    }
    if stats.latency.count > 0 && stats.latency.p99_ms > target.saturating_mul(2) {
        advice.push(format!(
            "Tail latency p99 ({}ms) is more than twice the target",
            stats.latency.p99_ms
        ));
    }
    if stats.pending_batch >= stats.batch_size.saturating_mul(2).max(1) {
        advice.push(format!(
            "Pending-queue depth high ({} requests): consider a larger batch size",
            stats.pending_batch
        ));
    }

    let counters = &stats.counters;
    if counters.total_requests >= MIN_SAMPLE_FOR_RATIOS {
        let timeout_rate = counters.timeouts as f64 / counters.total_requests as f64;
        if timeout_rate > 0.1 {
            advice.push(format!(
                "Timeout rate high ({:.0}%): providers are slower than the configured budget",
                timeout_rate * 100.0
            ));
        }
    }
    if counters.rate_limited > 0 {
        advice.push(format!(
            "{} requests were rate limited: spread calls out or raise provider quotas",
            counters.rate_limited
        ));
    }
    if stats.cache.lookups() >= MIN_SAMPLE_FOR_RATIOS && stats.cache.hit_rate() < 0.2 {
        advice.push(format!(
            "Cache hit rate low ({:.0}%): consider longer TTLs or normalized cache keys",
            stats.cache.hit_rate() * 100.0
        ));
    }

    if stats.cache.evictions > 0 && stats.cache.fill_ratio() >= 0.9 {
        advice.push(format!(
            "Cache is full ({} of {} entries) and evicting: consider a larger cache",
            stats.cache.total_entries, stats.cache.capacity
        ));
    }

    advice
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(values: impl IntoIterator<Item = u64>) -> ResponseTimeStats {
        let mut stats = ResponseTimeStats::new();
        for v in values {
            stats.record(v);
        }
        stats
    }

    #[test]
    fn test_nearest_rank_percentiles() {
        let stats = filled((1..=10).map(|i| i * 100));
        let summary = stats.summary();

        assert_eq!(summary.count, 10);
        assert_eq!(summary.p50_ms, 500);
        assert_eq!(summary.p95_ms, 1000);
        assert_eq!(summary.p99_ms, 1000);
        assert_eq!(summary.max_ms, 1000);
        assert_eq!(summary.avg_ms, 550.0);
    }

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let stats = filled(0..1500);
        assert_eq!(stats.len(), SAMPLE_CAPACITY);
        assert_eq!(stats.total_recorded(), 1500);

        let summary = stats.summary();
        assert_eq!(summary.max_ms, 1499);
        // 0..=499 were evicted
        assert_eq!(stats.percentile(0.1), Some(500));
    }

    #[test]
    fn test_summary_of_huge_samples_does_not_overflow() {
        let stats = filled([u64::MAX, u64::MAX]);
        let summary = stats.summary();

        assert_eq!(summary.max_ms, u64::MAX);
        assert_eq!(summary.avg_ms, u64::MAX as f64);
    }

    #[test]
    fn test_empty_summary() {
        let stats = ResponseTimeStats::new();
        assert_eq!(stats.summary(), LatencySummary::default());
        assert_eq!(stats.percentile(95.0), None);
    }

    #[test]
    fn test_unsorted_input() {
        let stats = filled([900, 100, 500, 300, 700]);
        assert_eq!(stats.percentile(50.0), Some(500));
        assert_eq!(stats.percentile(100.0), Some(900));
    }

    #[test]
    fn test_counters_classify_failures() {
        let counters = SchedulerCounters::default();
        counters.record_failure(&ResilienceError::Timeout { timeout_ms: 10 });
        counters.record_failure(&ResilienceError::Validation("x".to_string()));
        counters.record_failure(&ResilienceError::Cancelled("x".to_string()));
        counters.record_success(true);

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.failures, 3);
        assert_eq!(snapshot.timeouts, 1);
        assert_eq!(snapshot.validation_failures, 1);
        assert_eq!(snapshot.cache_hits, 1);
    }

    fn stats_with(latency: LatencySummary, within_target: bool) -> SchedulerStats {
        SchedulerStats {
            latency,
            counters: CounterSnapshot::default(),
            cache: CacheStats::default(),
            pending_batch: 0,
            batch_size: 5,
            max_response_time_ms: 1000,
            target_percentile: 95,
            target_percentile_ms: latency.p95_ms,
            within_target,
        }
    }

    #[test]
    fn test_healthy_stats_have_no_recommendations() {
        let latency = LatencySummary {
            count: 10,
            avg_ms: 100.0,
            p50_ms: 100,
            p95_ms: 200,
            p99_ms: 300,
            max_ms: 300,
        };
        assert!(recommendations(&stats_with(latency, true)).is_empty());
    }

    #[test]
    fn test_breaches_produce_recommendations() {
        let latency = LatencySummary {
            count: 10,
            avg_ms: 1500.0,
            p50_ms: 1500,
            p95_ms: 2500,
            p99_ms: 2600,
            max_ms: 2600,
        };
        let mut stats = stats_with(latency, false);
        stats.pending_batch = 12;

        let advice = recommendations(&stats);
        assert!(advice.iter().any(|a| a.contains("above target")));
        assert!(advice.iter().any(|a| a.contains("Tail latency")));
        assert!(advice.iter().any(|a| a.contains("Pending-queue depth high")));
    }

    #[test]
    fn test_evicting_full_cache_is_reported() {
        let mut stats = stats_with(LatencySummary::default(), true);
        stats.cache.capacity = 100;
        stats.cache.total_entries = 100;
        assert!(recommendations(&stats).is_empty(), "full without evictions is fine");

        stats.cache.evictions = 3;
        let advice = recommendations(&stats);
        assert!(advice.iter().any(|a| a.contains("100 of 100 entries")));
    }
}
