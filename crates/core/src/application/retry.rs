// Retry logic for collaborator calls
use crate::application::worker::constants::RETRY_BACKOFF_FACTOR;
use crate::port::CollaboratorError;
use std::time::Duration;
use tracing::{info, warn};

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the given backoff
    Retry(Duration),
    /// Give up, the run fails
    Failed,
}

/// Bounded exponential backoff
///
/// `delay = base * factor^(attempt - 1) * (1.0 ± 0.1)`
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    base_delay: Duration,
    max_attempts: u32,
    /// Only transient errors are retried when set
    transient_only: bool,
}

impl RetryPolicy {
    /// Policy for AI generation: transient errors only
    pub fn for_generation(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
            transient_only: true,
        }
    }

    /// Policy for publishing: any error gets the configured retries
    pub fn for_publishing(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
            transient_only: false,
        }
    }

    /// Longest time a call sequence can take when every attempt times out
    ///
    /// Backoffs are counted at the top of their ±10% spread.
    pub fn max_elapsed(&self, call_timeout: Duration) -> Duration {
        let waits_ms: u64 = (1..self.max_attempts)
            .map(|attempt| {
                (self.base_delay.as_millis() as f64 * RETRY_BACKOFF_FACTOR.powi(attempt as i32 - 1))
                    as u64
            })
            .sum();
        call_timeout * self.max_attempts + Duration::from_millis((waits_ms * 11 + 9) / 10)
    }

    /// Decide what to do after `attempt` (1-based) failed with `error`
    ///
    /// `seed` keeps the ±10% jitter deterministic per execution.
    pub fn should_retry(&self, attempt: u32, error: &CollaboratorError, seed: &str) -> RetryDecision {
        if self.transient_only && !error.is_transient() {
            warn!(attempt, error = %error, "Permanent error, not retrying");
            return RetryDecision::Failed;
        }
        if attempt >= self.max_attempts {
            warn!(
                attempt,
                max_attempts = self.max_attempts,
                "Max retry attempts reached"
            );
            return RetryDecision::Failed;
        }

        let delay = self.backoff(attempt, seed);
        info!(
            attempt,
            max_attempts = self.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "Scheduling retry"
        );
        RetryDecision::Retry(delay)
    }

    /// Backoff after the `attempt`-th failure
    pub fn backoff(&self, attempt: u32, seed: &str) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let base_ms = self.base_delay.as_millis() as f64 * RETRY_BACKOFF_FACTOR.powi(exponent);

        // ±10% spread so simultaneous failures do not retry in lockstep
        let jitter_seed = seed.chars().map(|c| c as u32).fold(0u32, u32::wrapping_add);
        let jitter_factor = 0.9 + ((jitter_seed % 21) as f64 / 100.0);

        Duration::from_millis((base_ms * jitter_factor) as u64)
    }
}
