//! Common helpers for end-to-end tests.

use std::sync::Arc;
use std::time::Duration;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::simulation::{PatternName, SimulationConfig, Simulator};
use crate::testing::simulator_with;
use crate::time::SimulatedTimeSource;

/// A seeded simulator with `pattern` selected.
pub fn pattern_simulator(pattern: PatternName, seed: u64) -> Simulator {
    let simulator = simulator_with(SimulationConfig::default(), seed);
    simulator.set_pattern(pattern);
    simulator
}

/// A breaker on its own simulated clock, returned alongside the clock.
pub fn breaker_with_clock(
    threshold: u32,
    reset_timeout: Duration,
) -> (CircuitBreaker, Arc<SimulatedTimeSource>) {
    let clock = Arc::new(SimulatedTimeSource::default());
    let config = CircuitBreakerConfig::default()
        .with_threshold(threshold)
        .with_reset_timeout(reset_timeout);
    let breaker = CircuitBreaker::with_time_source("e2e", config, clock.clone());
    (breaker, clock)
}
