use scribe_core::{ScribeError, ScribeResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Retry behaviour for chat-model requests that fail before streaming starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub backoff_base_ms: u64,
    /// Cap on a single backoff delay, in milliseconds.
    pub backoff_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
        }
    }
}

/// Whether an error is transient and worth another attempt.
///
/// Rate limits (429), timeouts, dropped connections and server errors (5xx)
/// are retried. Client errors such as 400 or 401 are not.
pub fn is_retryable(err: &ScribeError) -> bool {
    if !matches!(err, ScribeError::Http(_) | ScribeError::Search(_)) {
        return false;
    }
    let lower = err.to_string().to_lowercase();

    if lower.contains("400") || lower.contains("401") || lower.contains("403") {
        return false;
    }

    lower.contains("429")
        || lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("connection")
        || lower.contains("500")
        || lower.contains("502")
        || lower.contains("503")
        || lower.contains("504")
}

/// Exponential backoff for `attempt` (zero-based), capped at `backoff_max_ms`.
pub fn compute_backoff(policy: &RetryPolicy, attempt: u32) -> u64 {
    let delay = policy
        .backoff_base_ms
        .saturating_mul(2u64.saturating_pow(attempt));
    delay.min(policy.backoff_max_ms)
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// policy's retries are used up. The last error is returned.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> ScribeResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ScribeResult<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !is_retryable(&e) => {
                warn!(what, attempt, error = %e, "Non-retryable error");
                return Err(e);
            }
            Err(e) if attempt >= policy.max_retries => {
                warn!(what, attempt, error = %e, "Retries exhausted");
                return Err(e);
            }
            Err(e) => {
                let delay = compute_backoff(policy, attempt);
                info!(what, attempt, delay_ms = delay, error = %e, "Retryable error, backing off");
                tokio::time::sleep(Duration::from_millis(delay)).await;
                attempt += 1;
            }
        }
    }
}
