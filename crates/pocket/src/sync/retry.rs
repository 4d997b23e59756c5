//! Bounded retry with exponential backoff
//!
//! [`call_with_retry`] wraps a single remote call. Failures are classified by
//! a caller-supplied function so the fetch loop never inspects errors itself.

use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;

/// How a failure should be treated by the retry controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Remote throttling; wait `retry_after` if suggested
    RateLimited { retry_after: Option<Duration> },
    /// Network/timeout; retry with backoff
    Transient,
    /// Never retried
    Fatal,
}

/// Retry budget and delay schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Delay before the first retry; doubles on each subsequent one
    #[serde(with = "duration_millis")]
    pub base_delay: Duration,
    /// Upper bound on any single delay, including server-suggested ones
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,
    /// Total attempts allowed while the failure is rate limiting
    pub max_attempts_rate_limited: u32,
    /// Total attempts allowed while the failure is transient
    pub max_attempts_transient: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(3),
            max_delay: Duration::from_secs(60),
            max_attempts_rate_limited: 5,
            max_attempts_transient: 3,
        }
    }
}

impl RetryPolicy {
    /// A policy that never sleeps; useful in tests
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_attempts_rate_limited: max_attempts,
            max_attempts_transient: max_attempts,
        }
    }

    /// Attempt budget for a failure class (0 for fatal)
    pub fn max_attempts(&self, class: FailureClass) -> u32 {
        match class {
            FailureClass::RateLimited { .. } => self.max_attempts_rate_limited,
            FailureClass::Transient => self.max_attempts_transient,
            FailureClass::Fatal => 0,
        }
    }

    /// Delay before retrying after failed attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32, class: FailureClass) -> Duration {
        let exponential = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let delay = match class {
            FailureClass::RateLimited {
                retry_after: Some(suggested),
            } => suggested,
            _ => exponential,
        };
        delay.min(self.max_delay)
    }
}

/// Blocking delay between attempts
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Why a retried call gave up
#[derive(Debug, Clone, thiserror::Error)]
pub enum RetryError<E> {
    /// The failure was classified fatal and was not retried
    #[error("{0}")]
    Fatal(E),
    /// The retry budget ran out
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
}

/// Classification used for remote item fetches
pub fn classify_remote(error: &RemoteError) -> FailureClass {
    match error {
        RemoteError::RateLimited { retry_after, .. } => FailureClass::RateLimited {
            retry_after: *retry_after,
        },
        RemoteError::Transient(_) => FailureClass::Transient,
        RemoteError::Unauthorized(_) | RemoteError::PayloadTooLarge(_) | RemoteError::Fatal(_) => {
            FailureClass::Fatal
        }
    }
}

/// Run `operation` until it succeeds, fails fatally, or the budget runs out
///
/// `operation` receives the 1-based attempt number. The budget that applies
/// is the one for the class of the most recent failure.
pub fn call_with_retry<T, E, C, F>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    classify: C,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    C: Fn(&E) -> FailureClass,
    F: FnMut(u32) -> Result<T, E>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let error = match operation(attempt) {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        let class = classify(&error);
        if class == FailureClass::Fatal {
            return Err(RetryError::Fatal(error));
        }

        if attempt >= policy.max_attempts(class) {
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: error,
            });
        }

        let delay = policy.delay_for(attempt, class);
        warn!(
            "[RETRY] Attempt {} failed ({}), retrying in {:?}",
            attempt, error, delay
        );
        sleeper.sleep(delay);
    }
}

/// Serialize durations as integer milliseconds in settings files
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
