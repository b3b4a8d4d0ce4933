//! Sliding-window request counter for one service.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::config::ServiceLimit;

/// Snapshot of a service's admission window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LimitStatus {
    /// Requests recorded within the current window
    pub current: u32,
    /// Requests still admissible right now
    pub remaining: u32,
    pub limit: u32,
    pub window_ms: u64,
}

// == Rate Window ==
/// Timestamps of admitted requests, oldest at the front.
#[derive(Debug, Clone)]
pub struct RateWindow {
    requests: VecDeque<Instant>,
    limit: u32,
    window: Duration,
}

impl RateWindow {
    pub fn new(limit: ServiceLimit) -> Self {
        Self {
            requests: VecDeque::new(),
            limit: limit.limit,
            window: limit.window(),
        }
    }

    // == Try Acquire ==
    /// Admits one request at `now`, or returns how long until a slot frees.
    ///
    /// The check is strict: with `limit` requests already in the window the
    /// next one is rejected.
    pub fn try_acquire(&mut self, now: Instant) -> Result<(), Duration> {
        self.prune(now);

        if self.requests.len() as u32 >= self.limit {
            let retry_after = match self.requests.front() {
                Some(oldest) => self
                    .window
                    .saturating_sub(now.saturating_duration_since(*oldest)),
                None => self.window,
            };
            return Err(retry_after);
        }

        self.requests.push_back(now);
        Ok(())
    }

    /// Reports the window at `now` without mutating it.
    pub fn status(&self, now: Instant) -> LimitStatus {
        let current = self
            .requests
            .iter()
            .filter(|ts| now.saturating_duration_since(**ts) < self.window)
            .count() as u32;

        LimitStatus {
            current,
            remaining: self.limit.saturating_sub(current),
            limit: self.limit,
            window_ms: self.window.as_millis() as u64,
        }
    }

    /// Drops timestamps that have left the window.
    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.requests.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                self.requests.pop_front();
            } else {
                break;
            }
        }
    }
}
