//! Request context, per-request lifecycle and outcome types.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::debug;

use crate::error::{ResilienceError, ServiceError};
use crate::retry::{RetryObserver, RetryPolicy};

// == Query Caps ==
/// Longest fact-check text sent to the provider, in characters
pub const MAX_FACT_CHECK_CHARS: usize = 2000;
/// Shortest fact-check text worth checking, in characters
pub const MIN_FACT_CHECK_CHARS: usize = 10;
pub const MAX_FACT_CHECK_RESULTS: u64 = 5;
pub const MAX_EMBEDDING_BATCH: u64 = 5;
pub const MAX_LLM_TOKENS: u64 = 500;
pub const LLM_TEMPERATURE: f64 = 0.3;

/// Future returned by a provider operation.
pub type OperationFuture = BoxFuture<'static, Result<Value, ServiceError>>;

/// A provider call: fact-check search, LLM classification, embedding or
/// vector search.
pub type Operation = Arc<dyn Fn(RequestContext) -> OperationFuture + Send + Sync>;

/// Wraps an async closure as an [`Operation`].
pub fn operation<F, Fut>(f: F) -> Operation
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ServiceError>> + Send + 'static,
{
    Arc::new(move |context| f(context).boxed())
}

// == Request Kind ==
/// Logical request type; selects validation and query optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    FactCheck,
    Llm,
    Embedding,
    VectorSearch,
    Other,
}

// == Request Context ==
/// Parameters handed to the provider operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    pub kind: RequestKind,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl RequestContext {
    pub fn new(kind: RequestKind) -> Self {
        Self {
            kind,
            params: Map::new(),
        }
    }

    pub fn fact_check(text: impl Into<String>) -> Self {
        Self::new(RequestKind::FactCheck).with_param("text", Value::String(text.into()))
    }

    pub fn llm(prompt: impl Into<String>) -> Self {
        Self::new(RequestKind::Llm).with_param("prompt", Value::String(prompt.into()))
    }

    pub fn embedding<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let texts = texts.into_iter().map(|t| Value::String(t.into())).collect();
        Self::new(RequestKind::Embedding).with_param("texts", Value::Array(texts))
    }

    pub fn vector_search(vector: Vec<f32>) -> Self {
        let vector = vector.into_iter().map(Value::from).collect();
        Self::new(RequestKind::VectorSearch).with_param("vector", Value::Array(vector))
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    pub fn text(&self) -> Option<&str> {
        self.params.get("text").and_then(Value::as_str)
    }

    /// Whether [`optimize_query`] shortened the text.
    pub fn is_truncated(&self) -> bool {
        self.params
            .get("truncated")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    // == Validate ==
    /// Rejects contexts the provider could not act on.
    pub fn validate(&self) -> Result<(), ResilienceError> {
        match self.kind {
            RequestKind::FactCheck => {
                let text = self
                    .text()
                    .ok_or_else(|| ResilienceError::Validation("fact-check request needs a text".to_string()))?;
                if text.trim().chars().count() < MIN_FACT_CHECK_CHARS {
                    return Err(ResilienceError::Validation(format!(
                        "text must be at least {} characters long",
                        MIN_FACT_CHECK_CHARS
                    )));
                }
                Ok(())
            }
            RequestKind::Llm => match self.params.get("prompt").and_then(Value::as_str) {
                Some(prompt) if !prompt.trim().is_empty() => Ok(()),
                _ => Err(ResilienceError::Validation("LLM request needs a prompt".to_string())),
            },
            RequestKind::Embedding => non_empty_array(self, "texts", "embedding request needs texts"),
            RequestKind::VectorSearch => non_empty_array(self, "vector", "vector search needs a vector"),
            RequestKind::Other => Ok(()),
        }
    }
}

fn non_empty_array(context: &RequestContext, key: &str, message: &str) -> Result<(), ResilienceError> {
    match context.params.get(key).and_then(Value::as_array) {
        Some(items) if !items.is_empty() => Ok(()),
        _ => Err(ResilienceError::Validation(message.to_string())),
    }
}

// == Optimize Query ==
/// Bounds the worst-case cost of a request before dispatch.
///
/// Fact-check text is cut to 2000 characters (flagging `truncated`) and
/// the result count capped at 5; embedding batches are capped at 5; LLM
/// calls get at most 500 tokens at temperature 0.3. Requests already within
/// the caps keep their values.
pub fn optimize_query(context: &RequestContext) -> RequestContext {
    let mut optimized = context.clone();
    let params = &mut optimized.params;

    match context.kind {
        RequestKind::FactCheck => {
            if let Some(text) = context.text() {
                if text.chars().count() > MAX_FACT_CHECK_CHARS {
                    let cut: String = text.chars().take(MAX_FACT_CHECK_CHARS).collect();
                    params.insert("text".to_string(), Value::String(cut));
                    params.insert("truncated".to_string(), Value::Bool(true));
                }
            }
            cap(params, "max_results", MAX_FACT_CHECK_RESULTS);
        }
        RequestKind::Embedding => cap(params, "batch_size", MAX_EMBEDDING_BATCH),
        RequestKind::Llm => {
            cap(params, "max_tokens", MAX_LLM_TOKENS);
            params.insert("temperature".to_string(), Value::from(LLM_TEMPERATURE));
        }
        RequestKind::VectorSearch | RequestKind::Other => {}
    }

    optimized
}

fn cap(params: &mut Map<String, Value>, key: &str, max: u64) {
    let value = params
        .get(key)
        .and_then(Value::as_u64)
        .map_or(max, |current| current.min(max));
    params.insert(key.to_string(), Value::from(value));
}

// == Request Options ==
/// Per-call knobs for `process_request`.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Overrides the scheduler's default timeout
    pub timeout: Option<Duration>,
    /// Enables caching under this fingerprint
    pub cache_key: Option<String>,
    /// TTL for the cached result, cache default when None
    pub cache_ttl: Option<Duration>,
    /// Enables admission control for this service
    pub service: Option<String>,
    /// Overrides the scheduler's retry policy
    pub retry_policy: Option<RetryPolicy>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }
}

// == Request State ==
/// Lifecycle of one scheduled request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Enqueued,
    CacheChecked,
    AdmissionChecked,
    Executing,
    Retrying,
    Succeeded,
    TimedOut,
    Failed,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestState::Succeeded | RequestState::TimedOut | RequestState::Failed
        )
    }

    pub fn can_transition_to(self, next: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (Enqueued, CacheChecked)
                | (Enqueued, Failed)
                | (CacheChecked, AdmissionChecked)
                | (CacheChecked, Succeeded)
                | (CacheChecked, Failed)
                | (AdmissionChecked, Executing)
                | (AdmissionChecked, Failed)
                | (Executing, Succeeded)
                | (Executing, Retrying)
                | (Executing, TimedOut)
                | (Executing, Failed)
                | (Retrying, Executing)
                | (Retrying, TimedOut)
        )
    }
}

// == Scheduled Request ==
/// A request owned by the scheduler until it settles.
pub struct ScheduledRequest {
    pub id: String,
    pub operation: Operation,
    pub context: RequestContext,
    pub enqueued_at: Instant,
    pub timeout: Duration,
    pub state: RequestState,
    pub retries: u32,
}

impl ScheduledRequest {
    pub fn new(id: String, operation: Operation, context: RequestContext, timeout: Duration) -> Self {
        Self {
            id,
            operation,
            context,
            enqueued_at: Instant::now(),
            timeout,
            state: RequestState::Enqueued,
            retries: 0,
        }
    }

    pub fn transition(&mut self, next: RequestState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(request_id = %self.id, from = ?self.state, to = ?next, "Request state change");
        self.state = next;
    }
}

impl RetryObserver for ScheduledRequest {
    fn on_attempt(&mut self, _attempt: u32) {
        if self.state == RequestState::Retrying {
            self.transition(RequestState::Executing);
        }
    }

    fn on_retry(&mut self, _attempt: u32, _error: &ServiceError, _delay: Duration) {
        self.transition(RequestState::Retrying);
        self.retries += 1;
    }
}

// == Response Source ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Cache,
    Api,
}

// == Request Outcome ==
/// What `process_request` reports; failures are values, never panics or
/// propagated errors.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub request_id: String,
    /// Where the data came from; None on failure
    pub source: Option<ResponseSource>,
    pub response_time_ms: u64,
    pub retries: u32,
    /// Set when the fact-check text was shortened before dispatch
    pub truncated: bool,
    pub result: Result<Value, ResilienceError>,
}

impl RequestOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn data(&self) -> Option<&Value> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&ResilienceError> {
        self.result.as_ref().err()
    }

    /// Outcome for a request that never reached the scheduler's pipeline.
    pub fn cancelled(request_id: String, reason: &str) -> Self {
        Self {
            request_id,
            source: None,
            response_time_ms: 0,
            retries: 0,
            truncated: false,
            result: Err(ResilienceError::Cancelled(reason.to_string())),
        }
    }
}
