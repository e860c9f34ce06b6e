//! Bounded exponential-backoff retry for backend calls
//!
//! [`execute_with_retry`] holds no state between calls. The policy and the
//! observer are passed in on every invocation, so one provider can share a
//! single policy across all of its requests.

use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{EmbeddingError, EmbeddingResult};

/// Default upper bound for a single wait
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Retry parameters for one operation
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; `0` means a single attempt
    pub max_retries: u32,
    /// Wait before the first retry
    pub initial_delay: Duration,
    /// Growth factor applied per retry
    pub backoff_multiplier: f64,
    /// Upper bound for any single wait
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), 2.0)
    }
}

impl RetryPolicy {
    /// Policy with the default delay cap
    pub fn new(max_retries: u32, initial_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            max_retries,
            initial_delay,
            backoff_multiplier,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    /// Single attempt, never waits
    pub fn no_retry() -> Self {
        Self::new(0, Duration::ZERO, 1.0)
    }

    /// Override the delay cap
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Backoff before retry number `attempt + 1`:
    /// `initial_delay * backoff_multiplier^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self
            .backoff_multiplier
            .max(1.0)
            .powi(attempt.min(i32::MAX as u32) as i32);
        let secs = self.initial_delay.as_secs_f64() * factor;

        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Wait before the next attempt, honoring a backend `Retry-After` hint
    pub fn delay_for_error(&self, attempt: u32, error: &EmbeddingError) -> Duration {
        let backoff = self.delay_for_attempt(attempt);
        match error.retry_after() {
            Some(hint) => backoff.max(hint).min(self.max_delay),
            None => backoff,
        }
    }
}

/// Sink for retry progress, so callers can log or count attempts
pub trait RetryObserver: Send + Sync {
    /// A retryable failure happened and the executor will wait `delay`
    fn on_retry(&self, attempt: u32, max_retries: u32, delay: Duration, error: &EmbeddingError);

    /// The operation succeeded after `attempts` total attempts
    fn on_success(&self, _attempts: u32, _elapsed: Duration) {}

    /// The operation gave up after `attempts` total attempts
    fn on_give_up(&self, _attempts: u32, _elapsed: Duration, _error: &EmbeddingError) {}
}

/// Observer that reports through `tracing`
#[derive(Debug, Clone)]
pub struct TracingRetryObserver {
    provider: String,
}

impl TracingRetryObserver {
    /// Observer tagging events with `provider`
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
        }
    }
}

impl RetryObserver for TracingRetryObserver {
    fn on_retry(&self, attempt: u32, max_retries: u32, delay: Duration, error: &EmbeddingError) {
        warn!(
            provider = %self.provider,
            attempt,
            max_retries,
            delay_ms = delay.as_millis() as u64,
            "Embedding request failed, retrying: {}",
            error
        );
    }

    fn on_success(&self, attempts: u32, elapsed: Duration) {
        if attempts > 1 {
            debug!(
                provider = %self.provider,
                attempts,
                elapsed_ms = elapsed.as_millis() as u64,
                "Embedding request succeeded after retries"
            );
        }
    }

    fn on_give_up(&self, attempts: u32, elapsed: Duration, error: &EmbeddingError) {
        warn!(
            provider = %self.provider,
            attempts,
            elapsed_ms = elapsed.as_millis() as u64,
            retryable = error.is_retryable(),
            "Embedding request failed: {}",
            error
        );
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the policy's retries are used up. The last error is returned unchanged.
pub async fn execute_with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    observer: &dyn RetryObserver,
    mut operation: F,
) -> EmbeddingResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = EmbeddingResult<T>>,
{
    let started = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(value) => {
                observer.on_success(attempt + 1, started.elapsed());
                return Ok(value);
            }
            Err(error) => {
                if !error.is_retryable() || attempt >= policy.max_retries {
                    observer.on_give_up(attempt + 1, started.elapsed(), &error);
                    return Err(error);
                }

                let delay = policy.delay_for_error(attempt, &error);
                observer.on_retry(attempt + 1, policy.max_retries, delay, &error);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
