//! Bounded exponential backoff for transient provider failures.

use std::future::Future;
use std::time::Duration;

use crate::providers::ProviderError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Delay after the given failed attempt (1-indexed).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Delay before retrying `err`. A server-requested wait wins over the
    /// backoff when longer, still bounded by `max_delay`.
    pub fn delay_for(&self, attempt: u32, err: &ProviderError) -> Duration {
        let backoff = self.delay_after(attempt);
        match err.retry_after() {
            Some(hint) => backoff.max(hint.min(self.max_delay)),
            None => backoff,
        }
    }
}

impl Default for RetryPolicy {
    /// 4 attempts, 500ms base delay, capped at 30s.
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
pub struct RetryError {
    pub attempts: u32,
    pub last: ProviderError,
}

/// Runs `op` until it succeeds, fails with a non-transient error, or the
/// attempt budget is spent. Returns the value and the attempts it took.
pub async fn with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<(T, u32), RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok((value, attempt)),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt, &err);
                tracing::debug!(
                    op = label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(last) => {
                return Err(RetryError {
                    attempts: attempt,
                    last,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(5))
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100), Duration::from_millis(350));
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(350));
        assert_eq!(policy.delay_after(40), Duration::from_millis(350));
    }

    #[test]
    fn test_retry_after_hint_extends_delay_up_to_cap() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_secs(10));
        let throttled = |secs| ProviderError::Throttled {
            message: "429".into(),
            retry_after: Duration::from_secs(secs),
        };

        assert_eq!(policy.delay_for(1, &throttled(3)), Duration::from_secs(3));
        assert_eq!(policy.delay_for(1, &throttled(60)), Duration::from_secs(10));
        assert_eq!(
            policy.delay_for(2, &ProviderError::Transient("timeout".into())),
            Duration::from_millis(200)
        );
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        assert_eq!(fast_policy(0).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = &AtomicU32::new(0);
        let result = with_backoff(&fast_policy(3), "test", || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ProviderError::Transient("timeout".into()))
            } else {
                Ok("done")
            }
        })
        .await
        .unwrap();

        assert_eq!(result, ("done", 3));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = &AtomicU32::new(0);
        let err = with_backoff(&fast_policy(3), "test", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(ProviderError::Transient("timeout".into()))
        })
        .await
        .unwrap_err();

        assert_eq!(err.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(err.last.is_transient());
    }

    #[tokio::test]
    async fn test_non_transient_fails_immediately() {
        let calls = &AtomicU32::new(0);
        let err = with_backoff(&fast_policy(5), "test", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(ProviderError::Rejected("bad request".into()))
        })
        .await
        .unwrap_err();

        assert_eq!(err.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
