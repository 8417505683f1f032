//! Retry policy object: retries are configured as data, not scattered
//! call-site loops, so the crawler adapter and the event bus publisher can
//! share one implementation.

use std::time::Duration;

use crate::error::KollektivError;

/// Exponential backoff with a cap, matching the crawler's submit/retry
/// schedule and the event bus's publish retry.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
    pub multiplier: f64,
}

impl Backoff {
    pub const fn new(base: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            base,
            max,
            multiplier,
        }
    }

    /// Delay before the `attempt`-th retry (`attempt` is 1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let scaled = self.base.as_secs_f64() * self.multiplier.powi(attempt.saturating_sub(1) as i32);
        Duration::from_secs_f64(scaled.min(self.max.as_secs_f64()))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(200), Duration::from_secs(30), 2.0)
    }
}

/// A retry policy: how many attempts, how long to wait between them, and
/// which errors are worth retrying at all.
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub retryable_predicate: Box<dyn Fn(&KollektivError) -> bool + Send + Sync>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
            retryable_predicate: Box::new(KollektivError::is_retryable),
        }
    }

    pub fn with_predicate(
        mut self,
        predicate: impl Fn(&KollektivError) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.retryable_predicate = Box::new(predicate);
        self
    }

    /// Run `op`, retrying per this policy. Gives up and returns the last
    /// error once `max_attempts` is exhausted or the predicate rejects it.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, KollektivError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, KollektivError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let retryable = (self.retryable_predicate)(&err);
                    if !retryable || attempt >= self.max_attempts {
                        return Err(err);
                    }
                    let delay = err.retry_after().unwrap_or_else(|| self.backoff.delay(attempt));
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Backoff::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(5, Backoff::new(Duration::from_millis(1), Duration::from_millis(5), 2.0));
        let calls2 = calls.clone();
        let result = policy
            .run(|| {
                let calls = calls2.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(KollektivError::RetryableExternal {
                            service: "test",
                            reason: "boom".into(),
                            retry_after: None,
                        })
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_stop_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::default();
        let calls2 = calls.clone();
        let result: Result<(), _> = policy
            .run(|| {
                let calls = calls2.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(KollektivError::Validation("bad".into()))
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_caps_at_max() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(4), 2.0);
        assert_eq!(backoff.delay(1), Duration::from_secs(1));
        assert_eq!(backoff.delay(2), Duration::from_secs(2));
        assert_eq!(backoff.delay(3), Duration::from_secs(4));
        assert_eq!(backoff.delay(10), Duration::from_secs(4));
    }
}
