use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use tokio::time::sleep;

use crate::{
    transport::{execute, AttemptOutcome, PreparedRequest, Transport},
    ClientConfig,
};

/// Governs whether and when a failed attempt is repeated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for every following one.
    pub retry_delay: Duration,
    pub retry_status_codes: BTreeSet<u16>,
}

impl RetryPolicy {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
            retry_status_codes: config.retry_status_codes.clone(),
        }
    }

    /// Delay before retrying after attempt `attempt_number` (zero-based):
    /// `retry_delay * 2^attempt_number`, without cap or jitter.
    ///
    /// Saturates at `Duration::MAX` instead of overflowing.
    pub fn backoff_delay(&self, attempt_number: u32) -> Duration {
        2u32.checked_pow(attempt_number)
            .and_then(|multiplier| self.retry_delay.checked_mul(multiplier))
            .unwrap_or(Duration::MAX)
    }

    /// Whether the outcome of attempt `attempt_number` should be retried.
    ///
    /// Attempts without any response are always eligible; responses are
    /// eligible only when their status is in `retry_status_codes`.
    pub fn should_retry(&self, outcome: &AttemptOutcome, attempt_number: u32) -> bool {
        if attempt_number >= self.max_retries {
            return false;
        }
        match outcome.status() {
            None => true,
            Some(status) => self.retry_status_codes.contains(&status),
        }
    }
}

/// Per-call bookkeeping, dropped once the call terminates.
#[derive(Clone, Copy, Debug)]
pub struct AttemptState {
    pub attempt_number: u32,
    pub start_time: Instant,
}

impl AttemptState {
    fn new() -> Self {
        Self {
            attempt_number: 0,
            start_time: Instant::now(),
        }
    }
}

/// Runs attempts until one is not retryable or retries are exhausted, and
/// returns the outcome of the last attempt.
///
/// `prepare` is invoked before every attempt, so changes to shared client
/// state made while a call is backing off apply to its next attempt.
pub(crate) async fn dispatch<F>(
    transport: &dyn Transport,
    policy: &RetryPolicy,
    mut prepare: F,
) -> AttemptOutcome
where
    F: FnMut() -> PreparedRequest,
{
    let mut state = AttemptState::new();
    loop {
        let request = prepare();

        #[cfg(feature = "tracing")]
        tracing::debug!(
            method = %request.method,
            url = %request.url,
            attempt = state.attempt_number,
            "sending request"
        );

        let outcome = execute(transport, request).await;

        if !policy.should_retry(&outcome, state.attempt_number) {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                status = ?outcome.status(),
                attempts = state.attempt_number + 1,
                elapsed_ms = u64::try_from(state.start_time.elapsed().as_millis()).unwrap_or(u64::MAX),
                "request finished"
            );
            return outcome;
        }

        let delay = policy.backoff_delay(state.attempt_number);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            status = ?outcome.status(),
            attempt = state.attempt_number,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "retrying request"
        );

        sleep(delay).await;
        state.attempt_number += 1;
    }
}
