use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio_retry::RetryIf;
use tracing::{debug, warn};

/// Transport retry settings for idempotent requests
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries on top of the first attempt
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub use_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(5000),
            use_jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Policy with a fixed short delay and no jitter, for tests and local tooling
    pub fn immediate(max_retries: usize) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            use_jitter: false,
        }
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Delay before each retry, in order. Yields `max_retries` items.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let base = self.base_delay.as_millis() as u64;
        let max = self.max_delay.as_millis() as u64;
        let backoff = exponential_backoff(base, Some(max));
        let jitter = self.use_jitter;

        (1..=self.max_retries).map(move |attempt| {
            let delay = backoff(attempt);
            if jitter {
                add_jitter(delay)
            } else {
                delay
            }
        })
    }
}

/// Run `action`, retrying according to `policy` while `should_retry` accepts the error.
/// The last error is returned once retries are exhausted or the error is not retryable.
pub async fn retry_if<T, E, A, Fut, C>(
    policy: &RetryPolicy,
    log_context: &str,
    action: A,
    mut should_retry: C,
) -> Result<T, E>
where
    A: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: FnMut(&E) -> bool,
    E: Display,
{
    let max_retries = policy.max_retries;
    let mut failures = 0usize;

    let result = RetryIf::start(policy.delays(), action, |err: &E| {
        failures += 1;
        let retry = should_retry(err);
        if retry && failures <= max_retries {
            warn!(
                "{} failed (attempt {}/{}): {}. Retrying",
                log_context,
                failures,
                max_retries + 1,
                err
            );
        }
        retry
    })
    .await;

    if result.is_ok() && failures > 0 {
        debug!("{} succeeded after {} attempts", log_context, failures + 1);
    }
    result
}

/// Exponential backoff strategy: base * 2^(attempt-1) with an optional maximum delay
pub fn exponential_backoff(
    base_ms: u64,
    max_ms: Option<u64>,
) -> impl Fn(usize) -> Duration + Send + Sync {
    move |attempt| {
        let exponent = attempt.saturating_sub(1).min(32) as u32;
        let delay = base_ms.saturating_mul(2u64.saturating_pow(exponent));
        match max_ms {
            Some(max) => Duration::from_millis(delay.min(max)),
            None => Duration::from_millis(delay),
        }
    }
}

/// Add up to 25% jitter so concurrent clients do not retry in lockstep
pub fn add_jitter(delay: Duration) -> Duration {
    let jitter_factor = fastrand::f64() * 0.25;
    let jitter_ms = (delay.as_millis() as f64 * jitter_factor) as u64;
    delay + Duration::from_millis(jitter_ms)
}
