//! Bounded retry with exponential backoff for contended transactions.
//!
//! Only `Error::Contention` is retried. Everything else, including deadline
//! expiry, is returned on the first occurrence: a timed-out transaction may
//! already have been applied, so repeating it could double-count.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Configuration for exponential backoff retry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,

    /// Delay before the first retry.
    #[serde(with = "millis")]
    pub initial_delay: Duration,

    /// Cap for exponential growth.
    #[serde(with = "millis")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (typically 2.0).
    pub backoff_multiplier: f64,

    /// Randomize each delay within [delay/2, delay]
    pub jitter: bool,
}

impl RetryConfig {
    /// 5 attempts, 10ms doubling to a 200ms cap.
    pub const DEFAULT: Self = Self {
        max_attempts: 5,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(200),
        backoff_multiplier: 2.0,
        jitter: true,
    };

    /// Single attempt, no waiting.
    pub const NONE: Self = Self {
        max_attempts: 1,
        initial_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        backoff_multiplier: 1.0,
        jitter: false,
    };

    /// Computes the delay before retry number `attempt` (0-indexed).
    ///
    /// `initial_delay * backoff_multiplier^attempt`, capped at `max_delay`.
    /// Multipliers below 1.0 (or NaN) are treated as 1.0.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.max(1.0).powi(attempt as i32);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        let capped_secs = delay_secs.min(self.max_delay.as_secs_f64());

        if self.jitter && capped_secs > 0.0 {
            let half = capped_secs / 2.0;
            let jittered = half + rand::thread_rng().gen_range(0.0..=half);
            Duration::from_secs_f64(jittered)
        } else {
            Duration::from_secs_f64(capped_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Result of a retried operation.
#[derive(Debug)]
pub enum RetryResult<T> {
    /// The operation succeeded.
    Success(T),

    /// Still contended after every attempt.
    ExhaustedRetries {
        /// The last error encountered.
        last_error: Error,
        /// Attempts made, including the initial one.
        attempts: u32,
    },

    /// A non-transient error occurred (not retried).
    PermanentError(Error),
}

/// Run `operation` until it succeeds, fails permanently, or runs out of attempts.
pub async fn retry_transient<T, F, Fut>(config: RetryConfig, mut operation: F) -> RetryResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => return RetryResult::Success(value),
            Err(e) if !e.is_transient() => return RetryResult::PermanentError(e),
            Err(e) => {
                attempt += 1;
                if attempt >= max_attempts {
                    return RetryResult::ExhaustedRetries {
                        last_error: e,
                        attempts: attempt,
                    };
                }

                let delay = config.delay_for_attempt(attempt - 1);
                tracing::debug!(
                    error = %e,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Transient store error, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Serialize durations as integer milliseconds in config files
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
