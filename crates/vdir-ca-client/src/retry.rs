//! Backoff for idempotent certificate authority reads.
//!
//! A read may be attempted several times, but the attempts and the waits
//! between them together never outlast the configured per-call timeout, so
//! a cert manager tick is delayed by at most one timeout per CA call.
//! Batch submission is never routed through here.

use std::future::Future;
use std::time::{Duration, Instant};

use crate::error::CaError;

/// How often, and for how long, a read is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    /// Attempts including the first.
    pub max_attempts: u32,
    /// Wait before the first retry; doubled for each later one.
    pub base_delay: Duration,
    /// Wall-clock limit for the whole call.
    pub budget: Duration,
}

impl RetryPolicy {
    /// Four attempts 200ms, 400ms and 800ms apart, cut off at `timeout`.
    pub(crate) fn within(timeout: Duration) -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(200),
            budget: timeout,
        }
    }

    /// Wait before the retry that follows zero-based `attempt`, or `None`
    /// when no attempts are left or the wait would use up the budget.
    fn next_delay(&self, attempt: u32, elapsed: Duration) -> Option<Duration> {
        if attempt + 1 >= self.max_attempts {
            return None;
        }
        let delay = self.base_delay.checked_mul(2u32.checked_pow(attempt)?)?;
        (elapsed + delay < self.budget).then_some(delay)
    }
}

/// Send a request, retrying transient transport failures within `policy`.
///
/// `classify` turns a transport error into a [`CaError`]; only transient
/// results are retried. An attempt still running when the budget runs out
/// is abandoned with [`CaError::Timeout`].
pub(crate) async fn retry_send<F, Fut, C>(
    operation: &'static str,
    policy: RetryPolicy,
    send: F,
    classify: C,
) -> Result<reqwest::Response, CaError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
    C: Fn(reqwest::Error) -> CaError,
{
    let start = Instant::now();
    let mut attempt = 0;
    loop {
        let remaining = policy.budget.saturating_sub(start.elapsed());
        let err = match tokio::time::timeout(remaining, send()).await {
            Ok(Ok(resp)) => return Ok(resp),
            Ok(Err(e)) => classify(e),
            Err(_) => {
                return Err(CaError::Timeout {
                    operation,
                    elapsed_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                })
            }
        };
        if !err.is_transient() {
            return Err(err);
        }
        let Some(delay) = policy.next_delay(attempt, start.elapsed()) else {
            return Err(err);
        };

        attempt += 1;
        tracing::warn!(
            operation,
            attempt,
            max_attempts = policy.max_attempts,
            error = %err,
            "certificate authority request failed, retrying in {delay:?}"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn unavailable(e: reqwest::Error) -> CaError {
        CaError::Unavailable {
            operation: "batch_detail",
            reason: e.to_string(),
        }
    }

    async fn refused() -> Result<reqwest::Response, reqwest::Error> {
        reqwest::Client::builder()
            .timeout(Duration::from_millis(50))
            .build()
            .unwrap()
            .get("http://127.0.0.1:1/")
            .send()
            .await
    }

    #[test]
    fn delays_double_until_attempts_or_budget_run_out() {
        let policy = RetryPolicy::within(Duration::from_secs(30));
        assert_eq!(policy.next_delay(0, Duration::ZERO), Some(Duration::from_millis(200)));
        assert_eq!(policy.next_delay(1, Duration::ZERO), Some(Duration::from_millis(400)));
        assert_eq!(policy.next_delay(2, Duration::ZERO), Some(Duration::from_millis(800)));
        assert_eq!(policy.next_delay(3, Duration::ZERO), None);

        let tight = RetryPolicy::within(Duration::from_secs(1));
        assert_eq!(tight.next_delay(0, Duration::from_millis(700)), Some(Duration::from_millis(200)));
        assert_eq!(tight.next_delay(1, Duration::from_millis(700)), None);
    }

    #[tokio::test]
    async fn retries_connection_failures_up_to_max_attempts() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = call_count.clone();
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(10),
            budget: Duration::from_secs(5),
        };

        let result = retry_send(
            "batch_detail",
            policy,
            || {
                cc.fetch_add(1, Ordering::SeqCst);
                refused()
            },
            unavailable,
        )
        .await;

        assert!(matches!(result, Err(CaError::Unavailable { .. })));
        assert_eq!(call_count.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn stops_retrying_when_the_next_wait_exceeds_the_budget() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = call_count.clone();
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(200),
            budget: Duration::from_millis(500),
        };

        let start = Instant::now();
        let result = retry_send(
            "batch_detail",
            policy,
            || {
                cc.fetch_add(1, Ordering::SeqCst);
                refused()
            },
            unavailable,
        )
        .await;

        assert!(result.is_err());
        // 200ms fits the budget; the following 400ms wait does not.
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn hung_attempt_is_abandoned_at_the_budget() {
        let policy = RetryPolicy::within(Duration::from_millis(100));
        let start = Instant::now();
        let result = retry_send(
            "download_batch",
            policy,
            std::future::pending::<Result<reqwest::Response, reqwest::Error>>,
            unavailable,
        )
        .await;

        assert!(matches!(
            result,
            Err(CaError::Timeout {
                operation: "download_batch",
                ..
            })
        ));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = call_count.clone();
        let result = retry_send(
            "batch_detail",
            RetryPolicy::within(Duration::from_secs(5)),
            || {
                cc.fetch_add(1, Ordering::SeqCst);
                refused()
            },
            |e| CaError::InvalidResponse {
                operation: "batch_detail",
                reason: e.to_string(),
            },
        )
        .await;

        assert!(matches!(result, Err(CaError::InvalidResponse { .. })));
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }
}
