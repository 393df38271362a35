//! Shared test fixtures.

use std::sync::Arc;
use std::time::Duration;

use crate::simulation::{SimulationConfig, Simulator};
use crate::time::SimulatedTimeSource;

/// Slack allowed between a requested sleep and the paused clock's elapsed time.
const ELAPSED_TOLERANCE: Duration = Duration::from_millis(2);

/// A seeded simulator on a fixed simulated clock.
///
/// Two simulators built with the same arguments make identical draws.
pub fn simulator_with(config: SimulationConfig, seed: u64) -> Simulator {
    Simulator::seeded(config, seed).with_time_source(Arc::new(SimulatedTimeSource::default()))
}

/// Assert that `elapsed` covers `expected`, allowing for timer granularity.
#[track_caller]
pub fn assert_elapsed(elapsed: Duration, expected: Duration) {
    assert!(
        elapsed >= expected && elapsed <= expected + ELAPSED_TOLERANCE,
        "expected ~{expected:?}, measured {elapsed:?}"
    );
}
