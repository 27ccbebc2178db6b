//! Ban backoff and inter-job cooldown.
//!
//! Consecutive blocks sleep `base * factor^n` plus random jitter, never less
//! than the previous sleep and never more than `max_delay`. A blocked fetch
//! gives up once the sleeps spent on it would exceed `max_total_wait`.

use std::time::Duration;

use chrono::Local;
use tokio::time::Instant;

use crate::error::{AppError, Result};
use crate::models::{BackoffConfig, CooldownConfig};

/// Ephemeral backoff bookkeeping, reset after any successful fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackoffState {
    pub consecutive_bans: u32,
    pub last_delay: Option<Duration>,
    pub total_waited: Duration,
    pub next_allowed_time: Option<Instant>,
}

pub struct BackoffController {
    backoff: BackoffConfig,
    cooldown: CooldownConfig,
    state: BackoffState,
    rng: fastrand::Rng,
}

impl BackoffController {
    pub fn new(backoff: BackoffConfig, cooldown: CooldownConfig) -> Self {
        Self {
            backoff,
            cooldown,
            state: BackoffState::default(),
            rng: fastrand::Rng::new(),
        }
    }

    /// Use a fixed seed so jitter is reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = fastrand::Rng::with_seed(seed);
        self
    }

    pub fn state(&self) -> &BackoffState {
        &self.state
    }

    /// Next ban sleep, or `None` once the total wait budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        let base = self.backoff.base_secs as f64;
        let cap = self.backoff.max_delay_secs as f64;
        let exponent = i32::try_from(self.state.consecutive_bans).unwrap_or(i32::MAX);

        let raw = base * self.backoff.factor.powi(exponent);
        let jitter = raw * self.backoff.jitter_ratio * self.rng.f64();
        let secs = (raw + jitter).min(cap);

        let mut delay = Duration::try_from_secs_f64(secs.max(0.0))
            .unwrap_or(Duration::from_secs(self.backoff.max_delay_secs));
        if let Some(last) = self.state.last_delay {
            delay = delay.max(last);
        }

        let budget = Duration::from_secs(self.backoff.max_total_wait_secs);
        if self.state.total_waited.saturating_add(delay) > budget {
            return None;
        }

        self.state.consecutive_bans = self.state.consecutive_bans.saturating_add(1);
        self.state.last_delay = Some(delay);
        self.state.total_waited = self.state.total_waited.saturating_add(delay);
        self.state.next_allowed_time = Instant::now().checked_add(delay);
        Some(delay)
    }

    /// Sleep off a temporary block.
    pub async fn on_blocked(&mut self) -> Result<Duration> {
        let Some(delay) = self.next_delay() else {
            return Err(AppError::BlockedTooLong {
                waited_secs: self.state.total_waited.as_secs(),
            });
        };

        log::warn!(
            "Temporarily blocked ({} in a row). Sleeping until {}",
            self.state.consecutive_bans,
            wake_time(delay)
        );
        match self.state.next_allowed_time {
            Some(at) => tokio::time::sleep_until(at).await,
            None => tokio::time::sleep(delay).await,
        }
        Ok(delay)
    }

    /// Forget earlier bans after a fetch succeeds.
    pub fn on_success(&mut self) {
        if self.state.consecutive_bans > 0 {
            log::info!(
                "Block lifted after {} ban(s), {:?} waited",
                self.state.consecutive_bans,
                self.state.total_waited
            );
        }
        self.state = BackoffState::default();
    }

    /// Random pause drawn uniformly from the cooldown range.
    pub fn cooldown_delay(&mut self) -> Duration {
        let min = self.cooldown.min_secs;
        let max = self.cooldown.max_secs.max(min);
        Duration::from_secs(self.rng.u64(min..=max))
    }

    /// Sleep between jobs to spread load across the worker population.
    pub async fn cooldown(&mut self) -> Duration {
        let delay = self.cooldown_delay();
        if !delay.is_zero() {
            log::info!("Cooling down. Sleeping until {}", wake_time(delay));
            tokio::time::sleep(delay).await;
        }
        delay
    }
}

fn wake_time(delay: Duration) -> String {
    let wake = chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| Local::now().checked_add_signed(d))
        .unwrap_or_else(Local::now);
    wake.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BackoffConfig {
        BackoffConfig {
            base_secs: 60,
            factor: 2.0,
            jitter_ratio: 0.25,
            max_delay_secs: 600,
            max_total_wait_secs: 10_000,
        }
    }

    fn controller(backoff: BackoffConfig) -> BackoffController {
        BackoffController::new(backoff, CooldownConfig::disabled()).with_seed(7)
    }

    #[test]
    fn test_delays_grow_to_cap() {
        let mut ctl = controller(config());
        let delays: Vec<_> = (0..8).map(|_| ctl.next_delay().unwrap()).collect();

        assert!(delays[0] >= Duration::from_secs(60));
        assert!(delays[0] <= Duration::from_secs(75));
        for pair in delays.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
        assert!(delays.iter().all(|d| *d <= Duration::from_secs(600)));
        assert_eq!(*delays.last().unwrap(), Duration::from_secs(600));
    }

    #[test]
    fn test_success_resets_to_base() {
        let mut ctl = controller(config());
        for _ in 0..4 {
            ctl.next_delay();
        }
        ctl.on_success();
        assert_eq!(ctl.state(), &BackoffState::default());

        let delay = ctl.next_delay().unwrap();
        assert!(delay >= Duration::from_secs(60));
        assert!(delay <= Duration::from_secs(75));
    }

    #[test]
    fn test_total_wait_budget() {
        let mut ctl = controller(BackoffConfig {
            jitter_ratio: 0.0,
            max_total_wait_secs: 400,
            ..config()
        });
        // 60 + 120 = 180; adding 240 would exceed 400.
        assert_eq!(ctl.next_delay(), Some(Duration::from_secs(60)));
        assert_eq!(ctl.next_delay(), Some(Duration::from_secs(120)));
        assert_eq!(ctl.next_delay(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_blocked_sleeps_then_gives_up() {
        let mut ctl = controller(BackoffConfig {
            jitter_ratio: 0.0,
            max_total_wait_secs: 100,
            ..config()
        });
        let start = Instant::now();
        assert_eq!(ctl.on_blocked().await.unwrap(), Duration::from_secs(60));
        assert!(start.elapsed() >= Duration::from_secs(60));

        let err = ctl.on_blocked().await.unwrap_err();
        assert!(matches!(err, AppError::BlockedTooLong { waited_secs: 60 }));
    }

    #[test]
    fn test_huge_limits_saturate_instead_of_overflowing() {
        let mut ctl = controller(BackoffConfig {
            base_secs: 60,
            factor: 1e300,
            jitter_ratio: 0.0,
            max_delay_secs: u64::MAX,
            max_total_wait_secs: u64::MAX,
        });
        assert_eq!(ctl.next_delay(), Some(Duration::from_secs(60)));
        for _ in 0..4 {
            ctl.next_delay();
        }
        assert!(ctl.state().total_waited >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocked_sleep_ends_at_next_allowed_time() {
        let mut ctl = controller(BackoffConfig {
            jitter_ratio: 0.0,
            ..config()
        });
        ctl.on_blocked().await.unwrap();
        let allowed = ctl.state().next_allowed_time.unwrap();
        assert!(Instant::now() >= allowed);
    }

    #[test]
    fn test_cooldown_within_range() {
        let mut ctl = BackoffController::new(
            config(),
            CooldownConfig {
                min_secs: 10_800,
                max_secs: 14_400,
            },
        );
        for _ in 0..50 {
            let d = ctl.cooldown_delay();
            assert!(d >= Duration::from_secs(10_800) && d <= Duration::from_secs(14_400));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_cooldown_is_instant() {
        let mut ctl = controller(config());
        assert_eq!(ctl.cooldown().await, Duration::ZERO);
    }
}
