//! Retry policy: bounded attempts with exponential backoff.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::domain::{CallError, ErrorKind};

/// Retry policy for one call.
///
/// Delays grow as `initial_backoff * backoff_factor^(attempts - 1)` and are
/// capped at `max_backoff`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Upper bound on tries, the first one included.
    pub max_attempts: u32,

    /// Delay before the second try.
    pub initial_backoff: Duration,

    /// Ceiling for any single delay.
    pub max_backoff: Duration,

    /// Multiplier applied per retry.
    pub backoff_factor: f64,

    /// Error kinds worth another try.
    pub retry_on: Vec<ErrorKind>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("max attempts must be at least 1")]
    ZeroAttempts,

    #[error("initial backoff must be greater than zero")]
    ZeroBackoff,

    #[error("max backoff {max:?} is shorter than initial backoff {initial:?}")]
    MaxBelowInitial { initial: Duration, max: Duration },

    #[error("backoff factor {0} must be >= 1")]
    FactorBelowOne(f64),
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
            backoff_factor: 2.0,
            retry_on: vec![ErrorKind::Transient, ErrorKind::Transport],
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.max_attempts == 0 {
            return Err(PolicyError::ZeroAttempts);
        }
        if self.initial_backoff.is_zero() {
            return Err(PolicyError::ZeroBackoff);
        }
        if self.max_backoff < self.initial_backoff {
            return Err(PolicyError::MaxBelowInitial {
                initial: self.initial_backoff,
                max: self.max_backoff,
            });
        }
        // NaN fails this check too.
        if !(self.backoff_factor >= 1.0) {
            return Err(PolicyError::FactorBelowOne(self.backoff_factor));
        }
        Ok(())
    }

    /// Delay to wait after `attempts` failed tries (1-indexed).
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let base_secs = self.initial_backoff.as_secs_f64();
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_secs = base_secs * self.backoff_factor.powi(exponent);
        if !delay_secs.is_finite() || delay_secs >= self.max_backoff.as_secs_f64() {
            return self.max_backoff;
        }
        Duration::from_secs_f64(delay_secs)
    }

    /// Endorsement failures are never retried, whatever `retry_on` says.
    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        kind != ErrorKind::Endorsement && self.retry_on.contains(&kind)
    }
}

/// Run `attempt` until it succeeds, fails with a non-retryable error, or the
/// policy runs out of attempts.
///
/// `before_retry` is called with the error that caused each retry, after the
/// backoff sleep and right before the next try.
pub async fn retry<T, F, Fut, B>(
    policy: &RetryPolicy,
    mut before_retry: B,
    mut attempt: F,
) -> Result<T, CallError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CallError>>,
    B: FnMut(&CallError),
{
    let mut attempts = 1;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) if attempts < policy.max_attempts && policy.is_retryable(err.kind()) => {
                let delay = policy.next_delay(attempts);
                tracing::debug!(
                    attempt = attempts,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying call"
                );
                tokio::time::sleep(delay).await;
                before_retry(&err);
                attempts += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
