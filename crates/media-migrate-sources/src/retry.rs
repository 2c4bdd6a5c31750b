use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

use crate::error::MigrateError;

/// Exponential backoff for transient failures (5xx, connection errors).
#[derive(Debug, Clone)]
pub struct Backoff {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Backoff {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay before retry number `retry` (0-based): base, 2x base, 4x base...
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(retry.min(16))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// Run `op` until it succeeds, fails permanently, or runs out of attempts.
///
/// Exhausted transient failures surface as `ServiceUnavailable`.
pub async fn retry_with_backoff<T, F, Fut>(
    service: &'static str,
    backoff: &Backoff,
    mut op: F,
) -> Result<T, MigrateError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, MigrateError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                attempt += 1;
                if attempt >= backoff.max_attempts {
                    return Err(MigrateError::ServiceUnavailable {
                        service,
                        message: format!("gave up after {} attempts: {}", attempt, e),
                    });
                }
                let delay = backoff.delay_for(attempt - 1);
                warn!(
                    service = service,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Transient failure, retrying: {}",
                    e
                );
                sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn unavailable() -> MigrateError {
        MigrateError::ServiceUnavailable {
            service: "serializd",
            message: "503".to_string(),
        }
    }

    #[test]
    fn test_delay_doubles() {
        let backoff = Backoff::new(4, Duration::from_secs(1));
        assert_eq!(backoff.delay_for(0), Duration::from_secs(1));
        assert_eq!(backoff.delay_for(1), Duration::from_secs(2));
        assert_eq!(backoff.delay_for(2), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let calls = Cell::new(0);
        let result = retry_with_backoff("serializd", &Backoff::default(), || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n < 3 {
                    Err(unavailable())
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let start = tokio::time::Instant::now();
        let result: Result<(), _> = retry_with_backoff("serializd", &Backoff::default(), || {
            calls.set(calls.get() + 1);
            async { Err(unavailable()) }
        })
        .await;
        assert!(matches!(result, Err(MigrateError::ServiceUnavailable { .. })));
        assert_eq!(calls.get(), 3);
        // 1s + 2s of backoff between the three attempts
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(3) && waited < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_errors_are_not_retried() {
        let calls = Cell::new(0);
        let result: Result<(), _> = retry_with_backoff("serializd", &Backoff::default(), || {
            calls.set(calls.get() + 1);
            async { Err(MigrateError::InvalidCredentials { service: "serializd" }) }
        })
        .await;
        assert!(matches!(result, Err(MigrateError::InvalidCredentials { .. })));
        assert_eq!(calls.get(), 1);
    }
}
