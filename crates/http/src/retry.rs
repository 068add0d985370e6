//! Bounded retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use rusty_gcsfs_common::{GcsError, DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_INIT_DELAY_US};
use tracing::debug;

/// Backoff never sleeps longer than this between attempts.
const MAX_DELAY: Duration = Duration::from_secs(32);

/// Retry policy applied to all non-upload calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles each retry.
    pub init_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            init_delay: Duration::from_micros(DEFAULT_RETRY_INIT_DELAY_US),
        }
    }
}

impl RetryConfig {
    /// A config with the given backoff base, in microseconds. Tests use
    /// zero to retry without sleeping.
    pub fn with_init_delay_us(init_delay_us: u64) -> Self {
        Self {
            init_delay: Duration::from_micros(init_delay_us),
            ..Self::default()
        }
    }
}

/// Run `f`, retrying retryable failures up to the configured budget.
///
/// Non-retryable errors are returned immediately. When the budget is
/// exhausted the terminal error is `Aborted`, naming the attempt count
/// and the last cause.
pub async fn call_with_retries<F, Fut, T>(config: &RetryConfig, mut f: F) -> Result<T, GcsError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GcsError>>,
{
    let mut delay: Duration = config.init_delay;
    let mut last_error: Option<GcsError> = None;

    for attempt in 0..config.max_attempts {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => {
                debug!(attempt, error = %e, "retryable failure");
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }

        if attempt + 1 < config.max_attempts && !delay.is_zero() {
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(MAX_DELAY);
        }
    }

    let last: String = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    Err(GcsError::Aborted {
        message: format!(
            "All {} retry attempts failed. The last failure: {}",
            config.max_attempts, last
        ),
    })
}
