//! API Handlers
//!
//! HTTP handlers for the admin and telemetry endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;

use crate::config::Config;
use crate::error::{ResilienceError, Result};
use crate::limiter::LimitStatus;
use crate::models::{ClearResponse, DeleteResponse, HealthResponse};
use crate::scheduler::{PerformanceReport, RequestScheduler, SchedulerStats};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<RequestScheduler>,
}

impl AppState {
    pub fn new(scheduler: Arc<RequestScheduler>) -> Self {
        Self { scheduler }
    }

    /// Builds the scheduler, cache and limiter from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(Arc::new(RequestScheduler::from_config(config)))
    }
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let entries = state.scheduler.cache().read().await.len();
    Json(HealthResponse::healthy(entries))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<SchedulerStats> {
    Json(state.scheduler.get_stats().await)
}

/// Handler for GET /report
pub async fn report_handler(State(state): State<AppState>) -> Json<PerformanceReport> {
    Json(state.scheduler.generate_report().await)
}

/// Handler for GET /limits/:service
///
/// Pure read: does not count against the window.
pub async fn limit_status_handler(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Result<Json<LimitStatus>> {
    state
        .scheduler
        .limiter()
        .get_status(&service)
        .await
        .map(Json)
        .ok_or_else(|| ResilienceError::NotFound(format!("no rate window for service '{}'", service)))
}

/// Handler for DELETE /cache/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let deleted = state.scheduler.cache().write().await.delete(&key);
    if deleted {
        info!(key = %key, "Cache entry deleted");
        Ok(Json(DeleteResponse::new(key)))
    } else {
        Err(ResilienceError::NotFound(format!("key '{}'", key)))
    }
}

/// Handler for DELETE /cache
pub async fn clear_handler(State(state): State<AppState>) -> Json<ClearResponse> {
    let removed = {
        let mut cache = state.scheduler.cache().write().await;
        let removed = cache.len();
        cache.clear();
        removed
    };
    info!(removed, "Cache cleared");
    Json(ClearResponse::new(removed))
}
