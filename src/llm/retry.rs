//! Bounded retry with exponential backoff for LLM calls.
//!
//! The loop is an explicit state machine:
//!
//! ```text
//! Attempting ──ok──────────────────────────▶ Succeeded
//!     │
//!     └─err─▶ on_failure ─┬─ fatal error ──▶ FatallyFailed(Fatal)
//!                         ├─ budget spent ─▶ FatallyFailed(Exhausted)
//!                         └─ transient ────▶ Backoff ──sleep──▶ Attempting
//! ```
//!
//! Delay computation (`RetryPolicy::backoff_delay`) and the transition
//! function (`on_failure`) are pure. Sleeping and jitter are injected, so
//! tests drive the loop without waiting on a real clock.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, warn};

use crate::error::LlmError;

/// Retry budget and backoff schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the second failed attempt; doubles from there.
    pub base_delay: Duration,
    /// Upper bound on the nominal (pre-jitter) delay.
    pub max_delay: Duration,
    /// Jitter added on top of every delay is uniform in `[0, max_jitter)`.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(16),
            max_jitter: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Nominal delay after the attempt with 0-based index `failed_attempt`.
    ///
    /// 0, base, 2·base, 4·base, … capped at `max_delay`.
    pub fn nominal_delay(&self, failed_attempt: u32) -> Duration {
        if failed_attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.checked_pow(failed_attempt - 1).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Nominal delay plus `jitter` (a sample in `[0, 1)`) scaled by `max_jitter`.
    pub fn backoff_delay(&self, failed_attempt: u32, jitter: f64) -> Duration {
        let jitter = if jitter.is_finite() {
            jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.nominal_delay(failed_attempt) + self.max_jitter.mul_f64(jitter)
    }
}

/// Something that can wait.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real sleeper backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Source of jitter samples in `[0, 1)`.
pub trait JitterSource: Send + Sync {
    fn sample(&self) -> f64;
}

/// Uniform jitter from the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct UniformJitter;

impl JitterSource for UniformJitter {
    fn sample(&self) -> f64 {
        rand::thread_rng().r#gen::<f64>()
    }
}

/// Why the retry loop stopped without a value.
#[derive(Debug)]
pub enum RetryFailure {
    /// Every attempt failed with a transient error.
    Exhausted { attempts: u32, last_error: LlmError },
    /// A non-transient error ended the loop at once.
    Fatal { attempt: u32, error: LlmError },
}

/// State of one retry loop.
#[derive(Debug)]
pub enum RetryState<T> {
    Attempting {
        attempt: u32,
        last_error: Option<LlmError>,
    },
    Backoff {
        attempt: u32,
        delay: Duration,
        last_error: LlmError,
    },
    Succeeded {
        value: T,
        attempts: u32,
    },
    FatallyFailed(RetryFailure),
}

impl<T> RetryState<T> {
    pub fn start() -> Self {
        RetryState::Attempting {
            attempt: 0,
            last_error: None,
        }
    }
}

/// Transition after attempt `attempt` failed with `error`.
pub fn on_failure<T>(
    policy: &RetryPolicy,
    attempt: u32,
    error: LlmError,
    jitter: f64,
) -> RetryState<T> {
    if !error.is_transient() {
        return RetryState::FatallyFailed(RetryFailure::Fatal { attempt, error });
    }
    let attempts = attempt + 1;
    if attempts >= policy.max_attempts {
        return RetryState::FatallyFailed(RetryFailure::Exhausted {
            attempts,
            last_error: error,
        });
    }
    RetryState::Backoff {
        attempt,
        delay: policy.backoff_delay(attempt, jitter),
        last_error: error,
    }
}

/// Drive `op` through the retry state machine.
///
/// `op` receives the 0-based attempt index. On success returns the value and
/// the number of attempts used.
pub async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    jitter: &dyn JitterSource,
    mut op: F,
) -> Result<(T, u32), RetryFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut state = RetryState::start();
    loop {
        state = match state {
            RetryState::Attempting {
                attempt,
                last_error,
            } => {
                if let Some(ref e) = last_error {
                    debug!(attempt, previous_error = %e, "Retrying LLM call");
                }
                match op(attempt).await {
                    Ok(value) => RetryState::Succeeded {
                        value,
                        attempts: attempt + 1,
                    },
                    Err(error) => on_failure(policy, attempt, error, jitter.sample()),
                }
            }
            RetryState::Backoff {
                attempt,
                delay,
                last_error,
            } => {
                warn!(
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %last_error,
                    "Transient LLM error, backing off"
                );
                sleeper.sleep(delay).await;
                RetryState::Attempting {
                    attempt: attempt + 1,
                    last_error: Some(last_error),
                }
            }
            RetryState::Succeeded { value, attempts } => return Ok((value, attempts)),
            RetryState::FatallyFailed(failure) => return Err(failure),
        };
    }
}
