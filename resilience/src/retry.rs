//! Retry with backoff.
//!
//! An operation is re-run only when its error says it is retryable, and at
//! most `max_attempts` times in total. Between attempts the coordinator waits
//! `min(base * multiplier^(attempt-1), max)` scaled by a jitter factor drawn
//! from `[0.5, 1.0]`; the jitter only ever shortens the nominal wait.
//!
//! Errors that carry no classification are never retried: implementors of
//! [`Retryable`] must opt in explicitly.

use std::collections::HashSet;
use std::future::Future;
use std::num::NonZeroU32;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::circuit_breaker::CircuitBreakerError;
use crate::config::ConfigError;
use crate::error::Error;
use crate::simulation::{ErrorKind, SimulationError};

/// Errors that can tell the retry coordinator whether another attempt may help.
pub trait Retryable {
    /// Whether the failure is transient.
    fn is_retryable(&self) -> bool;

    /// The failure category, when the error has one. Errors with a kind are
    /// additionally filtered through [`RetryConfig::retryable_errors`].
    fn error_kind(&self) -> Option<ErrorKind> {
        None
    }
}

impl Retryable for SimulationError {
    fn is_retryable(&self) -> bool {
        Self::is_retryable(self)
    }

    fn error_kind(&self) -> Option<ErrorKind> {
        Some(self.kind())
    }
}

impl Retryable for Error {
    fn is_retryable(&self) -> bool {
        Self::is_retryable(self)
    }

    fn error_kind(&self) -> Option<ErrorKind> {
        self.kind()
    }
}

impl Retryable for CircuitBreakerError {
    fn is_retryable(&self) -> bool {
        false
    }
}

/// Dynamic errors are retryable only if they turn out to be a classified
/// simulation failure underneath.
impl Retryable for Box<dyn std::error::Error + Send + Sync> {
    fn is_retryable(&self) -> bool {
        self.downcast_ref::<SimulationError>()
            .is_some_and(SimulationError::is_retryable)
    }

    fn error_kind(&self) -> Option<ErrorKind> {
        self.downcast_ref::<SimulationError>()
            .map(SimulationError::kind)
    }
}

/// Retry policy for a single call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    max_attempts: NonZeroU32,
    base_delay: Duration,
    backoff_multiplier: f64,
    max_delay: Duration,
    retryable_errors: HashSet<ErrorKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: NonZeroU32::new(3).unwrap_or(NonZeroU32::MIN),
            base_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            retryable_errors: ErrorKind::ALL
                .into_iter()
                .filter(|kind| kind.is_retryable())
                .collect(),
        }
    }
}

impl RetryConfig {
    /// Default policy with exponential backoff (multiplier 2).
    #[must_use]
    pub fn exponential() -> Self {
        Self::default()
    }

    /// Default policy with linear backoff (multiplier 1): every wait is the base delay.
    #[must_use]
    pub fn linear() -> Self {
        Self {
            backoff_multiplier: 1.0,
            ..Self::default()
        }
    }

    /// Set the total number of attempts, including the first.
    ///
    /// # Errors
    ///
    /// Zero attempts is rejected.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Result<Self, ConfigError> {
        self.max_attempts = NonZeroU32::new(max_attempts).ok_or_else(|| ConfigError::InvalidValue {
            name: "max_attempts".to_string(),
            message: "must be at least 1".to_string(),
        })?;
        Ok(self)
    }

    #[must_use]
    pub const fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    #[must_use]
    pub const fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Set the backoff multiplier.
    ///
    /// # Errors
    ///
    /// The multiplier must be finite and at least 1.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Result<Self, ConfigError> {
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                name: "backoff_multiplier".to_string(),
                message: format!("{multiplier} must be a finite number >= 1"),
            });
        }
        self.backoff_multiplier = multiplier;
        Ok(self)
    }

    /// Restrict which error kinds may be retried.
    #[must_use]
    pub fn with_retryable_errors(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.retryable_errors = kinds.into_iter().collect();
        self
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts.get()
    }

    #[must_use]
    pub const fn backoff_multiplier(&self) -> f64 {
        self.backoff_multiplier
    }

    #[must_use]
    pub const fn retryable_errors(&self) -> &HashSet<ErrorKind> {
        &self.retryable_errors
    }

    /// Nominal wait after the given failed attempt (1-based), before jitter.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let nominal = (base_ms * self.backoff_multiplier.powi(exponent)).min(max_ms);
        Duration::from_millis(nominal.round() as u64)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn jittered_backoff<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let nominal = self.backoff(attempt).as_millis() as f64;
        let jitter = rng.random_range(0.5..=1.0);
        Duration::from_millis((nominal * jitter).round() as u64)
    }

    fn should_retry<E: Retryable>(&self, error: &E) -> bool {
        error.is_retryable()
            && error
                .error_kind()
                .is_none_or(|kind| self.retryable_errors.contains(&kind))
    }
}

/// The result of a retried call, with the bookkeeping diagnostics want.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    /// Final result: the first success, or the last failure.
    pub result: Result<T, E>,
    /// Number of times the operation was invoked.
    pub attempts: u32,
    /// Total time spent waiting between attempts.
    pub total_delay: Duration,
}

impl<T, E> RetryOutcome<T, E> {
    #[must_use]
    pub const fn had_retries(&self) -> bool {
        self.attempts > 1
    }

    pub fn into_result(self) -> Result<T, E> {
        self.result
    }
}

/// Run `operation` under `config`, retrying retryable failures.
pub async fn with_retry<T, E, F, Fut>(operation: F, config: &RetryConfig) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable,
{
    let mut rng = StdRng::from_os_rng();
    with_retry_reporting_rng(operation, config, &mut rng)
        .await
        .into_result()
}

/// [`with_retry`] with exponential backoff (multiplier 2).
pub async fn with_exponential_backoff<T, E, F, Fut>(
    operation: F,
    max_attempts: NonZeroU32,
    base_delay: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable,
{
    let config = RetryConfig {
        max_attempts,
        base_delay,
        ..RetryConfig::exponential()
    };
    with_retry(operation, &config).await
}

/// [`with_retry`] with linear backoff (multiplier 1).
pub async fn with_linear_backoff<T, E, F, Fut>(
    operation: F,
    max_attempts: NonZeroU32,
    base_delay: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable,
{
    let config = RetryConfig {
        max_attempts,
        base_delay,
        ..RetryConfig::linear()
    };
    with_retry(operation, &config).await
}

/// Run `operation` under `config`, drawing jitter from `rng`, and report how
/// many attempts it took.
pub async fn with_retry_reporting_rng<T, E, F, Fut, R>(
    mut operation: F,
    config: &RetryConfig,
    rng: &mut R,
) -> RetryOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable,
    R: Rng + ?Sized,
{
    let max_attempts = config.max_attempts();
    let mut total_delay = Duration::ZERO;
    let mut attempt = 1;

    loop {
        let error = match operation().await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                    total_delay,
                };
            }
            Err(error) => error,
        };

        if !config.should_retry(&error) {
            tracing::debug!("attempt {attempt} failed with a non-retryable error");
            return RetryOutcome {
                result: Err(error),
                attempts: attempt,
                total_delay,
            };
        }
        if attempt >= max_attempts {
            tracing::warn!("giving up after {attempt} attempts");
            return RetryOutcome {
                result: Err(error),
                attempts: attempt,
                total_delay,
            };
        }

        let delay = config.jittered_backoff(attempt, rng);
        tracing::debug!(
            "attempt {attempt}/{max_attempts} failed, retrying in {}ms",
            delay.as_millis()
        );
        tokio::time::sleep(delay).await;
        total_delay += delay;
        attempt += 1;
    }
}
