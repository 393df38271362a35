//! Circuit breaker.
//!
//! ```text
//!            failures >= threshold
//!   Closed ------------------------> Open
//!     ^                               |
//!     | trial succeeds                | reset_timeout elapsed
//!     |                               v
//!     +-------------------------- HalfOpen
//!              trial fails: back to Open
//! ```
//!
//! While open, calls are rejected without invoking the operation. The state
//! lives behind a mutex that is released before the operation is awaited, so
//! one breaker can be shared by any number of concurrent callers.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;

use crate::time::{SystemTimeSource, TimeSource};

pub const DEFAULT_THRESHOLD: u32 = 5;
pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(30);
/// Suggested per-call time limit for [`CircuitBreakerConfig::with_timeout`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_mins(1);

/// Where a breaker is in its closed -> open -> half-open cycle.
///
/// - `Closed`: calls run; consecutive failures are counted.
/// - `Open`: calls are rejected until `reset_timeout` has passed since the
///   last failure.
/// - `HalfOpen`: trial calls run; the first to finish closes the circuit on
///   success or reopens it on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        };
        f.write_str(name)
    }
}

/// Thresholds and timeouts for one breaker. Defaults to 5 failures, a 30 s
/// reset timeout and no per-call limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit. Always at least 1.
    pub threshold: u32,
    /// How long the circuit stays open before admitting a trial call.
    pub reset_timeout: Duration,
    /// Optional limit on each call. An operation still running when it
    /// expires is abandoned and counted as a failure.
    pub timeout: Option<Duration>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            reset_timeout: DEFAULT_RESET_TIMEOUT,
            timeout: None,
        }
    }
}

impl CircuitBreakerConfig {
    #[must_use]
    pub const fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = if threshold == 0 { 1 } else { threshold };
        self
    }

    #[must_use]
    pub const fn with_reset_timeout(mut self, reset_timeout: Duration) -> Self {
        self.reset_timeout = reset_timeout;
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Failures produced by the breaker itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitBreakerError {
    /// The circuit is open; the operation was not invoked.
    Open,
    /// The operation did not finish within the configured limit.
    TimedOut(Duration),
}

impl fmt::Display for CircuitBreakerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "circuit breaker is open"),
            Self::TimedOut(limit) => {
                write!(f, "operation timed out after {}ms", limit.as_millis())
            }
        }
    }
}

impl std::error::Error for CircuitBreakerError {}

/// Point-in-time view of a breaker, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub failures: u32,
    pub last_failure_ms: Option<u64>,
    pub total_calls: u64,
    pub rejected_calls: u64,
    pub timed_out_calls: u64,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failures: u32,
    last_failure_ms: Option<u64>,
    total_calls: u64,
    rejected_calls: u64,
    timed_out_calls: u64,
}

impl BreakerState {
    const fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            last_failure_ms: None,
            total_calls: 0,
            rejected_calls: 0,
            timed_out_calls: 0,
        }
    }
}

/// Guards an operation, refusing calls while the circuit is open.
///
/// # Invariants
///
/// - A success closes the circuit and zeroes `failures`.
/// - The circuit opens once `failures >= threshold`; while open no operation
///   runs and every call returns [`CircuitBreakerError::Open`].
/// - Open turns into half-open only on a call made after `reset_timeout`.
///
/// # Thread Safety
///
/// State lives behind one `Mutex` that is never held across an `.await`, so a
/// breaker can be shared through an `Arc` and called concurrently.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
    time_source: Arc<dyn TimeSource>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_time_source(name, config, Arc::new(SystemTimeSource))
    }

    pub fn with_time_source(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        time_source: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            name: name.into(),
            config: config.with_threshold(config.threshold),
            inner: Mutex::new(BreakerState::new()),
            time_source,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Run `operation` through the breaker.
    ///
    /// # Errors
    ///
    /// Returns `CircuitBreakerError::Open` (converted into `E`) without
    /// invoking the operation while the circuit is open, and
    /// `CircuitBreakerError::TimedOut` if a configured time limit expires.
    /// Otherwise the operation's own error is returned unchanged.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CircuitBreakerError>,
    {
        self.admit()?;

        let result = match self.config.timeout {
            Some(limit) => {
                if let Ok(result) = tokio::time::timeout(limit, operation()).await {
                    result
                } else {
                    self.lock().timed_out_calls += 1;
                    self.on_failure();
                    tracing::warn!(
                        "circuit '{}': call abandoned after {}ms",
                        self.name,
                        limit.as_millis()
                    );
                    return Err(CircuitBreakerError::TimedOut(limit).into());
                }
            }
            None => operation().await,
        };

        if result.is_ok() {
            self.on_success();
        } else {
            self.on_failure();
        }
        result
    }

    /// Current state. An open circuit whose reset timeout has elapsed still
    /// reports `Open` until the next call arrives.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Consecutive failures counted so far.
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.lock().failures
    }

    #[must_use]
    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.lock();
        CircuitBreakerStats {
            state: inner.state,
            failures: inner.failures,
            last_failure_ms: inner.last_failure_ms,
            total_calls: inner.total_calls,
            rejected_calls: inner.rejected_calls,
            timed_out_calls: inner.timed_out_calls,
        }
    }

    /// Force the circuit closed and forget all failures.
    pub fn reset(&self) {
        *self.lock() = BreakerState::new();
        tracing::info!("circuit '{}' reset", self.name);
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit(&self) -> Result<(), CircuitBreakerError> {
        let now_ms = self.time_source.now_ms();
        let half_opened = {
            let mut inner = self.lock();
            inner.total_calls += 1;
            match inner.state {
                CircuitState::Open => {
                    let since_failure = inner
                        .last_failure_ms
                        .map_or(u64::MAX, |last| now_ms.saturating_sub(last));
                    if u128::from(since_failure) > self.config.reset_timeout.as_millis() {
                        inner.state = CircuitState::HalfOpen;
                        Ok(true)
                    } else {
                        inner.rejected_calls += 1;
                        Err(CircuitBreakerError::Open)
                    }
                }
                CircuitState::Closed | CircuitState::HalfOpen => Ok(false),
            }
        };

        if half_opened? {
            tracing::info!("circuit '{}' half-open, admitting a trial call", self.name);
        }
        Ok(())
    }

    fn on_success(&self) {
        let mut inner = self.lock();
        let was_half_open = inner.state == CircuitState::HalfOpen;
        inner.state = CircuitState::Closed;
        inner.failures = 0;
        drop(inner);

        if was_half_open {
            tracing::info!("circuit '{}' closed after successful trial", self.name);
        }
    }

    fn on_failure(&self) {
        let now_ms = self.time_source.now_ms();
        let mut inner = self.lock();
        inner.failures = inner.failures.saturating_add(1);
        inner.last_failure_ms = Some(now_ms);

        let opens = match inner.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => inner.failures >= self.config.threshold,
            CircuitState::Open => false,
        };
        if opens {
            inner.state = CircuitState::Open;
        }
        let failures = inner.failures;
        drop(inner);

        if opens {
            tracing::warn!("circuit '{}' opened after {failures} failures", self.name);
        } else {
            tracing::debug!("circuit '{}' failure {failures}", self.name);
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
