/// Exponential-backoff retry for step dispatch
///
/// A retry policy wraps the whole dispatch variant (callout plus any
/// callback/webhook wait). Delays grow as delay * coefficient^attempt with a
/// per-delay ceiling, the retry count is bounded, and the entire sequence of
/// attempts runs under one overall deadline.

use crate::workflow::types::RetryPolicy;
use std::future::Future;
use std::time::Duration;

/// Delay before retry number `attempt` (0-based).
pub fn delay_for(policy: &RetryPolicy, attempt: u32) -> Duration {
    let base = policy.delay_secs as f64 * policy.backoff_coefficient.powi(attempt as i32);
    let capped = base.min(policy.max_delay_secs as f64);
    Duration::from_secs_f64(capped.max(0.0))
}

/// Outcome classification fed back by the operation under retry
pub trait Retryable {
    fn should_retry(&self) -> bool;
}

/// Run `op` under the retry policy.
///
/// Retries while the result asks for it, up to `max_retries` retries
/// (max_retries + 1 attempts total). The overall deadline covers every
/// attempt and every backoff sleep; hitting it returns None. The last
/// result is returned even when it still asks for a retry.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Option<T>
where
    T: Retryable,
    F: FnMut() -> Fut,
    Fut: Future<Output = T>,
{
    let deadline = Duration::from_secs(policy.timeout_secs);

    let attempts = async {
        let mut result = op().await;
        for attempt in 0..policy.max_retries {
            if !result.should_retry() {
                break;
            }
            let delay = delay_for(policy, attempt);
            tracing::debug!("Retry {} of {} after {:?}", attempt + 1, policy.max_retries, delay);
            tokio::time::sleep(delay).await;
            result = op().await;
        }
        result
    };

    tokio::time::timeout(deadline, attempts).await.ok()
}
