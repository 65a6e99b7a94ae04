//! Retry classification and backoff
//!
//! Transport failures are sorted into retryable and permanent by looking for a
//! handful of substrings in the error text. This is coarse and fragile: a
//! change in how the HTTP stack words its errors changes what gets retried.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Case-sensitive substrings that mark an error as transient.
pub const RETRYABLE_MARKERS: &[&str] = &["timeout", " 500 ", " 504 ", "DNS"];

/// Classifier verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Retryable,
    Permanent,
}

/// Classify an error by its message text.
pub fn classify<E: Display + ?Sized>(err: &E) -> Verdict {
    let message = err.to_string();
    if RETRYABLE_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
    {
        Verdict::Retryable
    } else {
        Verdict::Permanent
    }
}

/// Exponential backoff schedule.
///
/// Attempts are unbounded unless `max_attempts` is set; the schedule stops once
/// the next sleep would push total elapsed time past `max_elapsed`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay after the first failed attempt
    pub initial_interval: Duration,
    /// Growth factor applied per failed attempt
    pub multiplier: f64,
    /// Cap on a single delay
    pub max_interval: Duration,
    /// Cap on total time spent, including attempts
    pub max_elapsed: Option<Duration>,
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            multiplier: 1.5,
            max_interval: Duration::from_secs(60),
            max_elapsed: Some(Duration::from_secs(120)),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after `failed_attempts` consecutive failures (1-indexed).
    pub fn backoff_for_attempt(&self, failed_attempts: u32) -> Duration {
        if failed_attempts == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(failed_attempts - 1).unwrap_or(i32::MAX);
        let delay_ms = self.initial_interval.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped_ms = delay_ms.min(self.max_interval.as_millis() as f64);

        Duration::from_millis(capped_ms as u64)
    }

    /// Next sleep, or `None` when the policy is exhausted.
    pub fn next_delay(&self, failed_attempts: u32, elapsed: Duration) -> Option<Duration> {
        if let Some(max_attempts) = self.max_attempts {
            if failed_attempts >= max_attempts {
                return None;
            }
        }

        let delay = self.backoff_for_attempt(failed_attempts);
        if let Some(max_elapsed) = self.max_elapsed {
            if elapsed + delay > max_elapsed {
                return None;
            }
        }

        Some(delay)
    }
}

/// States of a retried operation. The last four are terminal.
#[derive(Debug)]
enum RetryState<T, E> {
    Attempting { attempt: u32 },
    Sleeping { attempt: u32, delay: Duration },
    Succeeded(T),
    FailedPermanent { attempts: u32, error: E },
    FailedExhausted { attempts: u32, error: E },
    Cancelled,
}

/// Terminal failure of [`retry_classified`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    Permanent { attempts: u32, error: E },
    Exhausted { attempts: u32, error: E },
    Cancelled,
}

/// Run `operation` until it succeeds, fails permanently, exhausts `policy`, or
/// `cancel` fires.
///
/// The operation receives the 1-indexed attempt number. Cancellation is
/// honoured both while an attempt is in flight and while sleeping.
pub async fn retry_classified<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let started = Instant::now();
    let mut state = RetryState::Attempting { attempt: 1 };

    loop {
        state = match state {
            RetryState::Attempting { attempt } => {
                if cancel.is_cancelled() {
                    RetryState::Cancelled
                } else {
                    let outcome = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        result = operation(attempt) => Some(result),
                    };

                    match outcome {
                        None => RetryState::Cancelled,
                        Some(Ok(value)) => RetryState::Succeeded(value),
                        Some(Err(error)) => match classify(&error) {
                            Verdict::Permanent => RetryState::FailedPermanent {
                                attempts: attempt,
                                error,
                            },
                            Verdict::Retryable => {
                                match policy.next_delay(attempt, started.elapsed()) {
                                    Some(delay) => {
                                        tracing::warn!(
                                            attempt,
                                            delay_ms = delay.as_millis() as u64,
                                            error = %error,
                                            "Transient failure, retrying after backoff"
                                        );
                                        RetryState::Sleeping { attempt, delay }
                                    }
                                    None => RetryState::FailedExhausted {
                                        attempts: attempt,
                                        error,
                                    },
                                }
                            }
                        },
                    }
                }
            }
            RetryState::Sleeping { attempt, delay } => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => RetryState::Cancelled,
                    _ = tokio::time::sleep(delay) => RetryState::Attempting { attempt: attempt + 1 },
                }
            }
            RetryState::Succeeded(value) => return Ok(value),
            RetryState::FailedPermanent { attempts, error } => {
                tracing::error!(attempts, error = %error, "Permanent failure, not retrying");
                return Err(RetryError::Permanent { attempts, error });
            }
            RetryState::FailedExhausted { attempts, error } => {
                tracing::error!(attempts, error = %error, "Retry policy exhausted");
                return Err(RetryError::Exhausted { attempts, error });
            }
            RetryState::Cancelled => return Err(RetryError::Cancelled),
        };
    }
}
