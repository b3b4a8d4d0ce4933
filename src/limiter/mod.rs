//! Admission Limiter
//!
//! Per-service sliding-window counters that grant or deny permission to
//! issue an outbound call, keeping the extension within provider quotas.

mod window;

use std::collections::HashMap;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::ServiceLimit;
use crate::error::{ResilienceError, Result};

pub use window::{LimitStatus, RateWindow};

// == Admission Limiter ==
/// Owns one [`RateWindow`] per configured service.
#[derive(Debug, Default)]
pub struct AdmissionLimiter {
    windows: Mutex<HashMap<String, RateWindow>>,
}

impl AdmissionLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a limiter with a window for each `(service, limit)` pair.
    pub fn with_limits<'a>(limits: impl IntoIterator<Item = (&'a String, &'a ServiceLimit)>) -> Self {
        let windows = limits
            .into_iter()
            .map(|(service, limit)| (service.clone(), RateWindow::new(*limit)))
            .collect();
        Self {
            windows: Mutex::new(windows),
        }
    }

    // == Configure ==
    /// Registers or replaces the window for `service`. Replacing discards
    /// the recorded history.
    pub async fn configure(&self, service: &str, limit: ServiceLimit) {
        debug!(service = %service, limit = limit.limit, window_ms = limit.window_ms, "Configuring rate window");
        self.windows
            .lock()
            .await
            .insert(service.to_string(), RateWindow::new(limit));
    }

    // == Check Limit ==
    /// Admits one request for `service` or fails with `RateLimitExceeded`.
    ///
    /// Services without a configured window are admitted untracked.
    pub async fn check_limit(&self, service: &str) -> Result<()> {
        let mut windows = self.windows.lock().await;
        let Some(window) = windows.get_mut(service) else {
            debug!(service = %service, "No rate window configured, admitting");
            return Ok(());
        };

        window.try_acquire(Instant::now()).map_err(|retry_after| {
            let retry_after_ms = retry_after.as_millis() as u64;
            warn!(service = %service, retry_after_ms, "Rate limit exceeded");
            ResilienceError::RateLimitExceeded {
                service: service.to_string(),
                retry_after_ms,
            }
        })
    }

    // == Get Status ==
    /// Current usage of `service`'s window, if one is configured.
    pub async fn get_status(&self, service: &str) -> Option<LimitStatus> {
        let windows = self.windows.lock().await;
        windows.get(service).map(|w| w.status(Instant::now()))
    }

    /// Names of all configured services, sorted.
    pub async fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.windows.lock().await.keys().cloned().collect();
        names.sort();
        names
    }
}
