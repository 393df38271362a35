//! Time source abstraction.
//!
//! Wall-clock reads (the seasonal load curve, circuit breaker cool-downs,
//! `last_run` stamps in the operation monitor) go through [`TimeSource`] so
//! that tests can drive them explicitly. Sleeping is left to `tokio::time`,
//! which tests pause and auto-advance instead.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Abstraction over wall-clock reads.
///
/// Implementations must be shareable across tasks: a single simulator or
/// breaker is typically behind an `Arc` and polled from many tasks.
pub trait TimeSource: Send + Sync {
    /// Get the current time in milliseconds since Unix epoch.
    fn now_ms(&self) -> u64;
}

/// Real time source using system clock.
///
/// This is the default implementation used outside of tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    #[allow(clippy::cast_possible_truncation)] // Milliseconds won't overflow u64 for billions of years
    fn now_ms(&self) -> u64 {
        // duration_since(UNIX_EPOCH) only fails if system time is before 1970,
        // in which case we report the epoch itself.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_millis() as u64)
            .unwrap_or_default()
    }
}

/// A simulated time source for deterministic testing.
///
/// Time only advances when explicitly told to. Backed by an atomic so it can
/// be shared with components that require `Send + Sync` clocks.
///
/// # Example
///
/// ```
/// use resilience::time::{SimulatedTimeSource, TimeSource};
///
/// let time = SimulatedTimeSource::new(1000);
/// assert_eq!(time.now_ms(), 1000);
///
/// time.advance(100);
/// assert_eq!(time.now_ms(), 1100);
///
/// time.set(5000);
/// assert_eq!(time.now_ms(), 5000);
/// ```
#[derive(Debug)]
pub struct SimulatedTimeSource {
    /// Current simulated time in milliseconds since Unix epoch.
    current_time_ms: AtomicU64,
}

impl SimulatedTimeSource {
    /// Create a new simulated time source with the given initial time.
    #[must_use]
    pub const fn new(initial_time_ms: u64) -> Self {
        Self {
            current_time_ms: AtomicU64::new(initial_time_ms),
        }
    }

    /// Create a new simulated time source starting at a reasonable default time.
    ///
    /// Uses `1_700_000_000_000` (approximately November 2023) as the starting point.
    #[must_use]
    pub const fn default_start() -> Self {
        Self::new(1_700_000_000_000)
    }

    /// Advance time by the given number of milliseconds.
    ///
    /// Time saturates at `u64::MAX` if overflow would occur.
    pub fn advance(&self, ms: u64) {
        // fetch_update only fails when the closure returns None, which it never does.
        let _ = self
            .current_time_ms
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_add(ms))
            });
    }

    /// Set the current time to a specific value. May move time backwards.
    pub fn set(&self, time_ms: u64) {
        self.current_time_ms.store(time_ms, Ordering::SeqCst);
    }
}

impl TimeSource for SimulatedTimeSource {
    fn now_ms(&self) -> u64 {
        self.current_time_ms.load(Ordering::SeqCst)
    }
}

impl Default for SimulatedTimeSource {
    fn default() -> Self {
        Self::default_start()
    }
}
