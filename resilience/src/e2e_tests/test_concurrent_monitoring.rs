//! Many concurrent simulated calls against one simulator and one monitor.

use std::sync::Arc;

use crate::error::Error;
use crate::monitor::OperationMonitor;
use crate::simulation::{ErrorKind, SimulationConfig};
use crate::testing::simulator_with;

#[tokio::test(start_paused = true)]
async fn test_concurrent_calls_are_all_accounted_for() {
    let simulator = Arc::new(simulator_with(SimulationConfig::new(50, 500, 0.3), 99));
    let monitor = Arc::new(OperationMonitor::new());

    let calls = (0..200).map(|i| {
        let simulator = Arc::clone(&simulator);
        let monitor = Arc::clone(&monitor);
        async move {
            monitor
                .track(
                    "report.export",
                    simulator.simulate_operation(|| async { Ok::<_, Error>(i) }, ErrorKind::Download),
                )
                .await
        }
    });
    let results = futures::future::join_all(calls).await;

    let failures = results.iter().filter(|r| r.is_err()).count() as u64;
    let metrics = monitor.get_metrics("report.export").unwrap();
    assert_eq!(metrics.count, 200);
    assert_eq!(metrics.errors, failures);
    assert_eq!(simulator.stats().injected_failures[&ErrorKind::Download], failures);
    assert!((30..=90).contains(&failures), "{failures}");
}

#[tokio::test(start_paused = true)]
async fn test_reconfiguration_during_flight() {
    let simulator = Arc::new(simulator_with(SimulationConfig::new(1000, 2000, 0.0), 4));

    let in_flight = {
        let simulator = Arc::clone(&simulator);
        tokio::spawn(async move {
            simulator
                .simulate_operation(|| async { Ok::<_, Error>(()) }, ErrorKind::Network)
                .await
        })
    };
    tokio::task::yield_now().await;

    // The in-flight call already took its snapshot.
    simulator.set_pattern(crate::simulation::PatternName::Heavy);
    simulator
        .set_config(crate::simulation::SimulationConfigUpdate {
            error_rate: Some(1.0),
            ..Default::default()
        })
        .unwrap();

    assert_eq!(in_flight.await.unwrap(), Ok(()));
}
