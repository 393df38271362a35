// Test code is allowed to use unwrap() for convenience.
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::cast_possible_truncation))]

// Life of a simulated call:
// 1. The caller hands an operation to the retry coordinator
// 2. Each attempt goes through a circuit breaker, which may refuse it
// 3. An admitted attempt reaches the simulator:
//     - Sleep for a delay drawn from the active pattern, scaled by time of day
//     - Inject a classified failure at the configured rate, or run the operation
// 4. The monitor records how long the whole call took and whether it failed
//
// System components:
//  - Simulator (patterns, network conditions, seasonal load curve, error injection)
//  - Retry coordinator
//  - Circuit breaker
//  - Progress simulator
//  - Operation monitor
//  - Diagnostics HTTP service

pub mod circuit_breaker;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod monitor;
pub mod progress;
pub mod retry;
pub mod simulation;
pub mod time;

#[cfg(test)]
mod e2e_tests;
#[cfg(test)]
mod testing;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};
pub use error::Error;
pub use monitor::{MetricsSnapshot, OperationMonitor, OperationTimer};
pub use progress::{ProgressConfig, ProgressSimulator};
pub use retry::{
    RetryConfig, RetryOutcome, Retryable, with_exponential_backoff, with_linear_backoff,
    with_retry, with_retry_reporting_rng,
};
pub use simulation::{ErrorKind, SimulationError, Simulator};
