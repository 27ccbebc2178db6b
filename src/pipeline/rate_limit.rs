//! Sliding-window call limiter for the content source.
//!
//! At most `max_calls` acquisitions are admitted within any window of
//! length `period`. One limiter is shared by every job a worker runs.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::models::RateLimitConfig;

#[derive(Debug)]
pub struct RateLimiter {
    max_calls: usize,
    period: Duration,
    // Admission times still inside the current window, oldest first.
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_calls: usize, period: Duration) -> Self {
        Self {
            max_calls: max_calls.max(1),
            period,
            calls: Mutex::new(VecDeque::with_capacity(max_calls)),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_calls, config.period())
    }

    /// Wait until the window admits one more call, then record it.
    ///
    /// The lock is held while waiting so concurrent callers are admitted in
    /// arrival order.
    pub async fn acquire(&self) {
        let mut calls = self.calls.lock().await;
        loop {
            let now = Instant::now();
            while calls
                .front()
                .is_some_and(|&admitted| now.duration_since(admitted) >= self.period)
            {
                calls.pop_front();
            }

            if calls.len() < self.max_calls {
                calls.push_back(now);
                return;
            }

            let Some(&oldest) = calls.front() else {
                continue;
            };
            let ready_at = oldest + self.period;
            log::info!(
                "Rate limit of {} calls per {:?} reached; waiting {:?}",
                self.max_calls,
                self.period,
                ready_at.saturating_duration_since(now)
            );
            tokio::time::sleep_until(ready_at).await;
        }
    }

    /// Calls recorded in the current window.
    #[cfg(test)]
    pub(crate) async fn in_window(&self) -> usize {
        let calls = self.calls.lock().await;
        let now = Instant::now();
        calls
            .iter()
            .filter(|&&admitted| now.duration_since(admitted) < self.period)
            .count()
    }
}
