// src/collect/retry.rs
use std::time::Duration;

use metrics::counter;
use tokio::sync::watch;

use crate::collect::types::{ErrorKind, SourceAdapter, SourceFailure, SourceResult};

/// Bounded retry with exponential backoff, wrapped around one adapter call.
///
/// Retries only `Transient` and `RateLimited` failures; `Malformed` and
/// `Unauthorized` fail fast. A provider-advertised Retry-After overrides the
/// computed backoff for that step.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total fetch invocations allowed per `execute` call, >= 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Backoff growth factor, >= 1.0.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

/// What one `execute` call resolved to, plus how many fetches it took.
/// The attempt count rides alongside the result; it is observability data,
/// not part of the `SourceResult` contract.
#[derive(Debug)]
pub struct RetryOutcome {
    pub result: SourceResult,
    pub attempts: u32,
}

/// Per-invocation bookkeeping; dropped once the call resolves.
struct RetryState {
    attempt: u32,
    last_error: Option<SourceFailure>,
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based):
    /// `base_delay * backoff_multiplier^(attempt-1)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1);
        self.base_delay.mul_f64(self.backoff_multiplier.powi(exp as i32))
    }

    /// Call `adapter.fetch()` until it succeeds, fails unretryably, or the
    /// attempt budget is exhausted. The shutdown signal cancels an in-flight
    /// fetch or backoff sleep; the source then resolves as a failure and the
    /// caller's cycle carries on winding down.
    pub async fn execute(
        &self,
        adapter: &dyn SourceAdapter,
        shutdown: &mut watch::Receiver<bool>,
    ) -> RetryOutcome {
        let mut state = RetryState {
            attempt: 0,
            last_error: None,
        };

        if *shutdown.borrow() {
            return RetryOutcome {
                result: SourceResult::Failure(cancelled(adapter.name())),
                attempts: 0,
            };
        }

        loop {
            state.attempt += 1;

            let result = tokio::select! {
                res = adapter.fetch() => res,
                _ = shutdown.changed() => {
                    let failure = state.last_error.take().unwrap_or_else(|| cancelled(adapter.name()));
                    return RetryOutcome {
                        result: SourceResult::Failure(failure),
                        attempts: state.attempt,
                    };
                }
            };

            let failure = match result {
                SourceResult::Success { .. } => {
                    return RetryOutcome {
                        result,
                        attempts: state.attempt,
                    }
                }
                SourceResult::Failure(f) => f,
            };

            if !failure.kind.is_retryable() || state.attempt >= self.max_attempts {
                // Exhausted or not worth retrying: hand back the last failure unchanged.
                return RetryOutcome {
                    result: SourceResult::Failure(failure),
                    attempts: state.attempt,
                };
            }

            let delay = failure
                .retry_after
                .unwrap_or_else(|| self.backoff_delay(state.attempt));

            tracing::debug!(
                target: "collector",
                source = %failure.source_name,
                attempt = state.attempt,
                kind = failure.kind.as_str(),
                delay_ms = delay.as_millis() as u64,
                "retrying after backoff"
            );
            counter!("collector_retry_attempts_total").increment(1);
            state.last_error = Some(failure);

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {
                    let failure = state
                        .last_error
                        .take()
                        .unwrap_or_else(|| cancelled(adapter.name()));
                    return RetryOutcome {
                        result: SourceResult::Failure(failure),
                        attempts: state.attempt,
                    };
                }
            }
        }
    }
}

fn cancelled(source_name: &str) -> SourceFailure {
    SourceFailure::new(source_name, ErrorKind::Transient, "cancelled by shutdown")
}
