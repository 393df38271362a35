//! The instant pattern is fast and almost never fails.

use std::time::Duration;

use tokio::time::Instant;

use crate::e2e_tests::helpers::pattern_simulator;
use crate::error::Error;
use crate::simulation::{ErrorKind, PatternName};

#[tokio::test(start_paused = true)]
async fn test_thousand_instant_operations() {
    let simulator = pattern_simulator(PatternName::Instant, 2024);
    let mut successes = 0;

    for i in 0..1000u32 {
        let start = Instant::now();
        let result = simulator
            .simulate_operation(|| async move { Ok::<_, Error>(i) }, ErrorKind::Network)
            .await;
        let elapsed = start.elapsed();

        // 110ms upper bound, +10% jitter, x1.17 peak load.
        assert!(elapsed < Duration::from_millis(150), "call {i} took {elapsed:?}");
        if result == Ok(i) {
            successes += 1;
        }
    }

    assert!(successes >= 990, "{successes}");
    assert_eq!(simulator.stats().delays, 1000);
}
