//! Retry primitives for an eventually-consistent control plane.
//!
//! Both helpers are plain async functions driven by a policy value and a
//! closure producing one attempt, so the policy can be tested on its own.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tokio::time::Instant;

use crate::domain::config::{RetryConfig, StartConfig};
use crate::domain::error::CopyError;

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Maximum number of attempts, including the first. Zero behaves as one.
    pub attempts: u32,
    /// Sleep before the second attempt; doubled for each further attempt.
    pub base_delay: Duration,
}

impl Backoff {
    /// Delay slept after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

impl From<&RetryConfig> for Backoff {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            attempts: cfg.attempts,
            base_delay: cfg.base_delay(),
        }
    }
}

/// Run `op` until it succeeds or `policy.attempts` is exhausted.
///
/// # Errors
///
/// Returns the error of the last attempt.
pub async fn retry_with_backoff<T, F, Fut>(policy: Backoff, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= attempts => return Err(e),
            Err(e) => {
                let delay = policy.delay_after(attempt);
                tracing::debug!(
                    what,
                    attempt,
                    attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %format!("{e:#}"),
                    "attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Fixed-interval polling with an overall deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poll {
    pub timeout: Duration,
    pub interval: Duration,
}

impl From<&StartConfig> for Poll {
    fn from(cfg: &StartConfig) -> Self {
        Self {
            timeout: cfg.timeout(),
            interval: cfg.poll_interval(),
        }
    }
}

/// Call `check` every `policy.interval` until it returns `true`.
///
/// The check always runs at least once.
///
/// # Errors
///
/// Returns [`CopyError::Timeout`] when the deadline passes first, or the
/// check's own error, which stops polling immediately.
pub async fn poll_until<F, Fut>(policy: Poll, what: &str, mut check: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let deadline = Instant::now() + policy.timeout;
    loop {
        if check().await? {
            return Ok(());
        }
        if Instant::now() + policy.interval > deadline {
            return Err(CopyError::Timeout {
                what: what.to_string(),
                secs: policy.timeout.as_secs(),
            }
            .into());
        }
        tracing::debug!(what, "not ready, polling again");
        tokio::time::sleep(policy.interval).await;
    }
}
