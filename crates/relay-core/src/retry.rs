//! Bounded retry with linear backoff for a single provider

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ProviderError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Final outcome of one provider's attempts
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome<T> {
    Success(T),
    TransientFailure(String),
    TerminalFailure(String),
}

impl<T> AttemptOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Failure reason, if this is a failure
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::TransientFailure(r) | Self::TerminalFailure(r) => Some(r),
        }
    }
}

/// Attempt budget and backoff base for one provider.
///
/// After the n-th transient failure the policy sleeps `base_delay * n` before
/// the next attempt. Terminal failures end the run immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay slept after the given (1-based) failed attempt
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Run `attempt_fn` until it succeeds, fails terminally, or the attempt
    /// budget is spent. Cancellation interrupts both the attempt and the
    /// backoff sleep and is reported as a terminal failure.
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut attempt_fn: F,
    ) -> AttemptOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut last_reason = String::new();

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return AttemptOutcome::TerminalFailure("cancelled".to_string());
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    return AttemptOutcome::TerminalFailure("cancelled".to_string());
                }
                result = attempt_fn() => result,
            };

            match result {
                Ok(value) => {
                    debug!(attempt, "Attempt succeeded");
                    return AttemptOutcome::Success(value);
                }
                Err(ProviderError::Terminal(reason)) => {
                    debug!(attempt, reason = %reason, "Terminal failure, not retrying");
                    return AttemptOutcome::TerminalFailure(reason);
                }
                Err(ProviderError::Transient(reason)) => {
                    warn!(attempt, max_attempts, reason = %reason, "Transient failure");
                    last_reason = reason;
                }
            }

            if attempt < max_attempts {
                let delay = self.delay_after(attempt);
                if !delay.is_zero() {
                    debug!(?delay, "Backing off before retry");
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            return AttemptOutcome::TerminalFailure("cancelled".to_string());
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        AttemptOutcome::TransientFailure(last_reason)
    }
}
