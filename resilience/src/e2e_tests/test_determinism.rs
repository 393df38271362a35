//! The same seed produces the same sequence of delays and outcomes.

use std::time::Duration;

use tokio::time::Instant;

use crate::e2e_tests::helpers::pattern_simulator;
use crate::simulation::{AuthKind, EmailKind, ErrorKind, PatternName, SimulationError};

async fn run_sequence(seed: u64) -> Vec<(Duration, Result<String, String>)> {
    let simulator = pattern_simulator(PatternName::Heavy, seed);
    let mut outcomes = Vec::new();

    for i in 0..20 {
        let start = Instant::now();
        let result = match i % 4 {
            0 => simulator
                .simulate_operation(
                    || async move { Ok::<_, SimulationError>(format!("op-{i}")) },
                    ErrorKind::Processing,
                )
                .await,
            1 => simulator.simulate_download("csv", 1_200_000).await,
            2 => simulator
                .simulate_auth("ops@example.com", "correct horse", AuthKind::Login)
                .await
                .map(|session| session.token),
            _ => simulator.simulate_email_send(EmailKind::Welcome).await,
        };
        outcomes.push((start.elapsed(), result.map_err(|e| e.to_string())));
    }

    outcomes
}

#[tokio::test(start_paused = true)]
async fn test_deterministic_sequence() {
    let run1 = run_sequence(8080).await;
    let run2 = run_sequence(8080).await;

    assert_eq!(run1.len(), 20);
    for (i, (a, b)) in run1.iter().zip(run2.iter()).enumerate() {
        assert_eq!(a.1, b.1, "outcome mismatch at {i}");
        assert!(a.0.abs_diff(b.0) <= Duration::from_millis(2), "delay mismatch at {i}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_different_seeds_diverge() {
    let run1 = run_sequence(1).await;
    let run2 = run_sequence(2).await;
    assert_ne!(
        run1.iter().map(|(_, r)| r.clone()).collect::<Vec<_>>(),
        run2.iter().map(|(_, r)| r.clone()).collect::<Vec<_>>()
    );
}
