//! An upload retried until it succeeds, with progress mirrored into a
//! progress simulator and the whole job timed by the monitor.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::monitor::OperationMonitor;
use crate::progress::ProgressSimulator;
use crate::retry::{RetryConfig, with_retry};
use crate::simulation::{SimulationConfig, UploadFile};
use crate::testing::simulator_with;

#[tokio::test(start_paused = true)]
async fn test_upload_retried_until_success() {
    // 2 x 0.1 = 20% per step past the halfway mark: most first attempts fail.
    let simulator = simulator_with(SimulationConfig::new(200, 400, 0.1), 1234);
    let monitor = OperationMonitor::new();
    let retry = RetryConfig::default()
        .with_base_delay(Duration::from_millis(100))
        .with_max_attempts(50)
        .unwrap();

    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reports);
    let progress = ProgressSimulator::new(move |p| sink.lock().unwrap().push(p));
    let file = UploadFile::new("quarterly.xlsx", 512_000);

    let uploaded = monitor
        .track(
            "upload",
            with_retry(
                || simulator.simulate_file_upload(&file, |p| progress.set_progress(f64::from(p))),
                &retry,
            ),
        )
        .await
        .unwrap();

    assert_eq!(uploaded.name, "quarterly.xlsx");
    assert_eq!(uploaded.size_bytes, 512_000);
    assert!((progress.current_progress() - 100.0).abs() < f64::EPSILON);

    let reports = reports.lock().unwrap().clone();
    assert_eq!(reports.last(), Some(&100));
    // Every attempt restarts from zero.
    let attempts = reports.iter().filter(|&&p| p == 0).count() as u64;
    assert_eq!(attempts, simulator.stats().injected_total() + 1);

    let metrics = monitor.get_metrics("upload").unwrap();
    assert_eq!(metrics.count, 1);
    assert_eq!(metrics.errors, 0);
}
