use media_migrate_config::RateLimitConfig;
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, warn};

use crate::error::MigrateError;

/// Request budget of `max_requests` per `window` for the destination service.
///
/// Permits are tracked by issue time, so the budget holds over any window-long
/// interval, not only aligned ones. A caller that finds the budget spent waits
/// until the oldest permit leaves the window.
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    backoff_base: Duration,
    state: Mutex<LimiterState>,
}

#[derive(Default)]
struct LimiterState {
    issued: VecDeque<Instant>,
    /// Calls in a row that ended in a surfaced rate-limit error
    consecutive_limited: u32,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration, backoff_base: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            backoff_base,
            state: Mutex::new(LimiterState::default()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            config.max_requests,
            Duration::from_secs(config.window_secs),
            Duration::from_secs(config.backoff_secs),
        )
    }

    /// Take one permit, blocking until the window has room
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;
        loop {
            let now = Instant::now();
            while let Some(&oldest) = state.issued.front() {
                if now.duration_since(oldest) >= self.window {
                    state.issued.pop_front();
                } else {
                    break;
                }
            }

            if (state.issued.len() as u32) < self.max_requests {
                state.issued.push_back(now);
                return;
            }

            let resume_at = match state.issued.front() {
                Some(&oldest) => oldest + self.window,
                None => now,
            };
            debug!(
                operation = "rate_limit",
                wait_ms = resume_at.saturating_duration_since(now).as_millis() as u64,
                "Request budget spent, waiting for the window to roll over"
            );
            sleep_until(resume_at).await;
        }
    }

    /// Run one destination call under the limiter.
    ///
    /// A rate-limit response is retried once after `Retry-After` (or the
    /// exponential default); a second one is returned to the caller.
    pub async fn call<T, F, Fut>(&self, mut op: F) -> Result<T, MigrateError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, MigrateError>>,
    {
        self.acquire().await;
        let result = match op().await {
            Err(MigrateError::RateLimitExceeded { service, retry_after }) => {
                let delay = self.rate_limit_delay(retry_after).await;
                warn!(
                    service = service,
                    delay_ms = delay.as_millis() as u64,
                    "Rate limited, retrying once after backoff"
                );
                sleep(delay).await;
                self.acquire().await;
                op().await
            }
            other => other,
        };

        let mut state = self.state.lock().await;
        match &result {
            Err(MigrateError::RateLimitExceeded { .. }) => state.consecutive_limited += 1,
            _ => state.consecutive_limited = 0,
        }
        result
    }

    async fn rate_limit_delay(&self, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(delay) => delay,
            None => {
                let state = self.state.lock().await;
                self.backoff_base * 2u32.saturating_pow(state.consecutive_limited.min(6))
            }
        }
    }
}
