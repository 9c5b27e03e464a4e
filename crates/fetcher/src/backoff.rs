//! Capped exponential back-off for transient fetch failures (5xx, network
//! errors). Origin errors that are not transient (4xx, NoSuchKey,
//! AccessDenied) must not be retried by the caller.

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub factor: u32,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            factor: 2,
            cap: Duration::from_secs(30),
            max_attempts: 3,
        }
    }
}

impl BackoffPolicy {
    /// The delay before attempt number `attempt` (1-indexed; attempt 1 is
    /// the first retry after the initial failed try).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self.factor.saturating_pow(attempt.saturating_sub(1));
        let millis = self
            .initial
            .as_millis()
            .saturating_mul(u128::from(multiplier));
        let capped = millis.min(self.cap.as_millis());
        Duration::from_millis(capped.min(u128::from(u64::MAX)) as u64)
    }
}

/// Retries `op` up to `policy.max_attempts` times total, sleeping between
/// attempts per [`BackoffPolicy::delay_for_attempt`]. Only retries while
/// `is_transient` returns true for the error; a non-transient error (or
/// exhaustion of attempts) is returned immediately.
pub async fn retry_transient<T, E, F, Fut>(
    policy: BackoffPolicy,
    is_transient: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempt = 0_u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= policy.max_attempts || !is_transient(&err) {
                    return Err(err);
                }
                tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_and_caps() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
        // way beyond the cap
        assert_eq!(policy.delay_for_attempt(20), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn stops_after_max_attempts() {
        let policy = BackoffPolicy {
            initial: Duration::from_millis(1),
            factor: 2,
            cap: Duration::from_millis(4),
            max_attempts: 3,
        };
        let mut calls = 0;
        let result: Result<(), &str> = retry_transient(policy, |_| true, || {
            calls += 1;
            async move { Err("boom") }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_transient() {
        let policy = BackoffPolicy::default();
        let mut calls = 0;
        let result: Result<(), &str> = retry_transient(policy, |_| false, || {
            calls += 1;
            async move { Err("permanent") }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
