//! Request Scheduler
//!
//! Orchestrates provider calls: cache lookup, admission check, retried
//! execution under a timeout, cache write-back and latency telemetry.
//! Many requests can be fanned out in bounded chunks or queued for
//! batched submission.

mod batch;
mod request;
mod telemetry;
mod timeout;

use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tokio::sync::{oneshot, Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::{CacheStore, SharedCache};
use crate::config::{Config, SchedulerConfig};
use crate::error::{ResilienceError, Result};
use crate::limiter::AdmissionLimiter;
use crate::retry::RetryController;

pub use batch::{BatchQueue, PendingRequest};
pub use request::{
    operation, optimize_query, Operation, OperationFuture, RequestContext, RequestKind, RequestOptions,
    RequestOutcome, RequestState, ResponseSource, ScheduledRequest, LLM_TEMPERATURE, MAX_EMBEDDING_BATCH,
    MAX_FACT_CHECK_CHARS, MAX_FACT_CHECK_RESULTS, MAX_LLM_TOKENS, MIN_FACT_CHECK_CHARS,
};
pub use telemetry::{
    nearest_rank, recommendations, CounterSnapshot, LatencySummary, PerformanceReport, ResponseTimeStats,
    SchedulerCounters, SchedulerStats, SAMPLE_CAPACITY,
};
pub use timeout::with_timeout;

/// One item of a fan-out or batch.
pub struct ParallelRequest {
    pub operation: Operation,
    pub context: RequestContext,
    pub options: RequestOptions,
}

impl ParallelRequest {
    pub fn new(operation: Operation, context: RequestContext, options: RequestOptions) -> Self {
        Self {
            operation,
            context,
            options,
        }
    }
}

fn new_request_id() -> String {
    format!("req_{}", Uuid::new_v4().simple())
}

// == Request Scheduler ==
/// Entry point for every outbound provider call.
///
/// The cache and limiter are injected so several schedulers can share them,
/// or tests can build isolated instances.
pub struct RequestScheduler {
    config: SchedulerConfig,
    cache: SharedCache,
    limiter: Arc<AdmissionLimiter>,
    retry: RetryController,
    telemetry: Mutex<ResponseTimeStats>,
    counters: SchedulerCounters,
    batch: Mutex<BatchQueue>,
}

impl RequestScheduler {
    pub fn new(config: SchedulerConfig, cache: SharedCache, limiter: Arc<AdmissionLimiter>) -> Self {
        Self {
            config,
            cache,
            limiter,
            retry: RetryController::new(),
            telemetry: Mutex::new(ResponseTimeStats::new()),
            counters: SchedulerCounters::default(),
            batch: Mutex::new(BatchQueue::new()),
        }
    }

    /// Builds the scheduler together with its cache and limiter. Meant for
    /// process start-up; everything else receives the scheduler by reference.
    pub fn from_config(config: &Config) -> Self {
        let cache = Arc::new(RwLock::new(CacheStore::from_config(&config.cache)));
        let limiter = Arc::new(AdmissionLimiter::with_limits(&config.service_limits));
        Self::new(config.scheduler.clone(), cache, limiter)
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    pub fn limiter(&self) -> &Arc<AdmissionLimiter> {
        &self.limiter
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    // == Process Request ==
    /// Runs one request through the full pipeline.
    ///
    /// Never fails: every error is reported inside the returned
    /// [`RequestOutcome`], and the elapsed time is always recorded.
    pub async fn process_request(
        &self,
        operation: Operation,
        context: RequestContext,
        options: RequestOptions,
    ) -> RequestOutcome {
        let timeout = options.timeout.unwrap_or(self.config.request_timeout);
        let mut request = ScheduledRequest::new(new_request_id(), operation, context, timeout);
        self.counters.record_request();

        let result = self.run(&mut request, &options).await;

        let response_time_ms = request.enqueued_at.elapsed().as_millis() as u64;
        self.record_response_time(response_time_ms).await;
        self.counters.record_retries(request.retries);

        let truncated = request.context.is_truncated();
        match result {
            Ok((data, source)) => {
                self.counters.record_success(source == ResponseSource::Cache);
                debug!(
                    request_id = %request.id,
                    source = ?source,
                    response_time_ms,
                    retries = request.retries,
                    "Request succeeded"
                );
                RequestOutcome {
                    request_id: request.id,
                    source: Some(source),
                    response_time_ms,
                    retries: request.retries,
                    truncated,
                    result: Ok(data),
                }
            }
            Err(error) => {
                self.counters.record_failure(&error);
                warn!(
                    request_id = %request.id,
                    kind = error.kind(),
                    error = %error,
                    response_time_ms,
                    "Request failed"
                );
                RequestOutcome {
                    request_id: request.id,
                    source: None,
                    response_time_ms,
                    retries: request.retries,
                    truncated,
                    result: Err(error),
                }
            }
        }
    }

    async fn run(&self, request: &mut ScheduledRequest, options: &RequestOptions) -> Result<(Value, ResponseSource)> {
        if let Err(error) = request.context.validate() {
            request.transition(RequestState::Failed);
            return Err(error);
        }
        request.context = optimize_query(&request.context);

        // == Cache ==
        if let Some(key) = &options.cache_key {
            let cached = self.cache.write().await.get(key);
            request.transition(RequestState::CacheChecked);
            if let Some(data) = cached {
                debug!(request_id = %request.id, key = %key, "Cache hit");
                request.transition(RequestState::Succeeded);
                return Ok((data, ResponseSource::Cache));
            }
        } else {
            request.transition(RequestState::CacheChecked);
        }

        // == Admission ==
        if let Some(service) = &options.service {
            if let Err(error) = self.limiter.check_limit(service).await {
                request.transition(RequestState::Failed);
                return Err(error);
            }
        }
        request.transition(RequestState::AdmissionChecked);

        // == Execute ==
        request.transition(RequestState::Executing);
        let policy = options.retry_policy.as_ref().unwrap_or(&self.config.retry_policy);
        let operation = Arc::clone(&request.operation);
        let context = request.context.clone();
        let timeout = request.timeout;

        let attempts = self
            .retry
            .execute_with(|| (*operation)(context.clone()), policy, &mut *request);
        let result = with_timeout(timeout, attempts).await;

        match result {
            Ok(data) => {
                if let Some(key) = &options.cache_key {
                    if let Err(error) = self.cache.write().await.set(key, &data, options.cache_ttl) {
                        warn!(key = %key, error = %error, "Failed to cache response");
                    }
                }
                request.transition(RequestState::Succeeded);
                Ok((data, ResponseSource::Api))
            }
            Err(error) => {
                let error = error.into_root_cause();
                let next = if matches!(error, ResilienceError::Timeout { .. }) {
                    RequestState::TimedOut
                } else {
                    RequestState::Failed
                };
                request.transition(next);
                Err(error)
            }
        }
    }

    // == Process Parallel ==
    /// Runs `requests` in chunks of `batch_size`.
    ///
    /// Chunks run one after another; items within a chunk run concurrently
    /// unless parallel processing is disabled. Outcomes keep input order.
    pub async fn process_parallel(&self, requests: Vec<ParallelRequest>) -> Vec<RequestOutcome> {
        let chunk_size = self.config.batch_size.max(1);
        let mut outcomes = Vec::with_capacity(requests.len());
        let mut requests = requests.into_iter().peekable();

        while requests.peek().is_some() {
            let chunk: Vec<ParallelRequest> = requests.by_ref().take(chunk_size).collect();
            debug!(chunk_len = chunk.len(), "Processing chunk");

            if self.config.enable_parallel_processing {
                let pending = chunk
                    .into_iter()
                    .map(|r| self.process_request(r.operation, r.context, r.options));
                outcomes.extend(join_all(pending).await);
            } else {
                for r in chunk {
                    outcomes.push(self.process_request(r.operation, r.context, r.options).await);
                }
            }
        }

        outcomes
    }

    // == Batching ==
    /// Queues a request for the next batch and waits for its outcome.
    ///
    /// The queue is flushed once it holds `batch_size` requests, or
    /// `batch_max_wait` after the first request of a batch arrived.
    pub async fn add_to_batch(
        self: &Arc<Self>,
        operation: Operation,
        context: RequestContext,
        options: RequestOptions,
    ) -> RequestOutcome {
        let (responder, receiver) = oneshot::channel();
        let (queued, generation) = {
            let mut queue = self.batch.lock().await;
            let queued = queue.push(PendingRequest {
                request: ParallelRequest::new(operation, context, options),
                responder,
            });
            (queued, queue.generation())
        };

        if queued >= self.config.batch_size {
            let scheduler = Arc::clone(self);
            tokio::spawn(async move {
                scheduler.flush_batch().await;
            });
        } else if queued == 1 {
            let scheduler = Arc::clone(self);
            let wait = self.config.batch_max_wait;
            tokio::spawn(async move {
                tokio::time::sleep(wait).await;
                scheduler.flush_generation(generation).await;
            });
        }

        receiver
            .await
            .unwrap_or_else(|_| RequestOutcome::cancelled(new_request_id(), "batch dropped before completion"))
    }

    /// Drains the queue now and returns how many requests were dispatched.
    pub async fn flush_batch(&self) -> usize {
        let drained = self.batch.lock().await.drain();
        self.dispatch(drained).await
    }

    async fn flush_generation(&self, generation: u64) {
        let drained = {
            let mut queue = self.batch.lock().await;
            if queue.generation() != generation || queue.is_empty() {
                return;
            }
            queue.drain()
        };
        debug!(count = drained.len(), "Max wait elapsed, flushing partial batch");
        self.dispatch(drained).await;
    }

    async fn dispatch(&self, drained: Vec<PendingRequest>) -> usize {
        if drained.is_empty() {
            return 0;
        }
        let count = drained.len();
        let (requests, responders): (Vec<_>, Vec<_>) =
            drained.into_iter().map(|p| (p.request, p.responder)).unzip();

        let outcomes = self.process_parallel(requests).await;
        for (responder, outcome) in responders.into_iter().zip(outcomes) {
            // Receiver gone means the caller stopped waiting
            let _ = responder.send(outcome);
        }
        info!(count, "Batch dispatched");
        count
    }

    pub async fn pending_batch_len(&self) -> usize {
        self.batch.lock().await.len()
    }

    // == Telemetry ==
    pub async fn record_response_time(&self, ms: u64) {
        self.telemetry.lock().await.record(ms);
    }

    /// Whether the configured percentile is at or below the latency target.
    /// True while no samples exist.
    pub async fn is_within_target(&self) -> bool {
        let percentile = f64::from(self.config.target_percentile);
        match self.telemetry.lock().await.percentile(percentile) {
            Some(ms) => ms <= self.config.max_response_time.as_millis() as u64,
            None => true,
        }
    }

    pub async fn get_stats(&self) -> SchedulerStats {
        let (latency, target_percentile_ms) = {
            let telemetry = self.telemetry.lock().await;
            let target = telemetry.percentile(f64::from(self.config.target_percentile));
            (telemetry.summary(), target)
        };
        let max_response_time_ms = self.config.max_response_time.as_millis() as u64;
        let cache = self.cache.read().await.stats();

        SchedulerStats {
            latency,
            counters: self.counters.snapshot(),
            cache,
            pending_batch: self.pending_batch_len().await,
            batch_size: self.config.batch_size,
            max_response_time_ms,
            target_percentile: self.config.target_percentile,
            target_percentile_ms: target_percentile_ms.unwrap_or(0),
            within_target: target_percentile_ms.map_or(true, |ms| ms <= max_response_time_ms),
        }
    }

    /// Stats snapshot with advice for every breached threshold. Advisory
    /// only; nothing here changes scheduling.
    pub async fn generate_report(&self) -> PerformanceReport {
        let stats = self.get_stats().await;
        let recommendations = recommendations(&stats);
        PerformanceReport {
            generated_at: chrono::Utc::now().to_rfc3339(),
            stats,
            recommendations,
        }
    }
}
