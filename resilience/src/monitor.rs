//! Per-operation timing and error counters.
//!
//! Operations are keyed by name. A timer returned by
//! [`OperationMonitor::start_operation`] records one run when ended; errors
//! are recorded separately with [`OperationMonitor::record_error`].
//!
//! Durations are measured on `tokio::time::Instant`, so they follow a paused
//! or advanced test clock. The injected [`TimeSource`] only stamps
//! `last_run_ms`.
//!
//! # Invariants
//! - Concurrent timers on the same name each count exactly once
//! - `errors` is independent of `count`: any number of errors may be recorded
//!   against a started name, so `error_rate` can exceed 1

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::time::{SystemTimeSource, TimeSource};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct OperationMetric {
    count: u64,
    total_time: Duration,
    errors: u64,
    last_run_ms: Option<u64>,
}

/// Metrics for one operation name, with derived averages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub count: u64,
    pub total_time_ms: u64,
    pub errors: u64,
    /// Wall-clock time the most recent run ended, in ms since the epoch.
    pub last_run_ms: Option<u64>,
    /// `total_time_ms / count`, or 0 before the first run.
    pub average_time_ms: f64,
    /// `errors / count`, or 0 before the first run. Not capped at 1.
    pub error_rate: f64,
}

impl From<OperationMetric> for MetricsSnapshot {
    #[allow(clippy::cast_precision_loss)]
    fn from(metric: OperationMetric) -> Self {
        let (average_time_ms, error_rate) = if metric.count == 0 {
            (0.0, 0.0)
        } else {
            (
                metric.total_time.as_secs_f64() * 1000.0 / metric.count as f64,
                metric.errors as f64 / metric.count as f64,
            )
        };
        Self {
            count: metric.count,
            total_time_ms: u64::try_from(metric.total_time.as_millis()).unwrap_or(u64::MAX),
            errors: metric.errors,
            last_run_ms: metric.last_run_ms,
            average_time_ms,
            error_rate,
        }
    }
}

/// Named operation counters behind a single mutex.
///
/// # Thread Safety
///
/// Every method takes `&self`; share the monitor through an `Arc`. The lock is
/// held only to read or update the map, never across an `.await`, so `track`
/// can time futures that run concurrently under the same name.
pub struct OperationMonitor {
    metrics: Mutex<HashMap<String, OperationMetric>>,
    time_source: Arc<dyn TimeSource>,
}

impl OperationMonitor {
    #[must_use]
    pub fn new() -> Self {
        Self::with_time_source(Arc::new(SystemTimeSource))
    }

    #[must_use]
    pub fn with_time_source(time_source: Arc<dyn TimeSource>) -> Self {
        Self {
            metrics: Mutex::new(HashMap::new()),
            time_source,
        }
    }

    /// Start timing one run of `name`. The run is recorded when the timer is ended.
    pub fn start_operation(&self, name: impl Into<String>) -> OperationTimer<'_> {
        OperationTimer {
            monitor: self,
            name: name.into(),
            started: Instant::now(),
        }
    }

    /// Count an error against `name`. Returns false, and records nothing, if
    /// `name` has never been started.
    pub fn record_error(&self, name: &str) -> bool {
        let mut metrics = self.lock();
        if let Some(metric) = metrics.get_mut(name) {
            metric.errors += 1;
            true
        } else {
            drop(metrics);
            tracing::debug!("error recorded for unknown operation '{name}', ignoring");
            false
        }
    }

    /// Time `operation` under `name`, counting an error if it fails.
    pub async fn track<T, E, Fut>(&self, name: &str, operation: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let timer = self.start_operation(name);
        let result = operation.await;
        timer.end();
        if result.is_err() {
            self.record_error(name);
        }
        result
    }

    #[must_use]
    pub fn get_metrics(&self, name: &str) -> Option<MetricsSnapshot> {
        self.lock().get(name).copied().map(MetricsSnapshot::from)
    }

    /// Snapshot of every operation, ordered by name.
    #[must_use]
    pub fn all_metrics(&self) -> BTreeMap<String, MetricsSnapshot> {
        self.lock()
            .iter()
            .map(|(name, metric)| (name.clone(), MetricsSnapshot::from(*metric)))
            .collect()
    }

    /// Clear one operation's metrics, or all of them.
    pub fn reset(&self, name: Option<&str>) {
        let mut metrics = self.lock();
        match name {
            Some(name) => {
                metrics.remove(name);
            }
            None => metrics.clear(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, OperationMetric>> {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_run(&self, name: String, elapsed: Duration) {
        let ended_ms = self.time_source.now_ms();
        let mut metrics = self.lock();
        let metric = metrics.entry(name).or_default();
        metric.count += 1;
        metric.total_time = metric.total_time.saturating_add(elapsed);
        metric.last_run_ms = Some(ended_ms);
        drop(metrics);
    }
}

impl Default for OperationMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OperationMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationMonitor")
            .field("operations", &self.lock().len())
            .finish_non_exhaustive()
    }
}

/// A running measurement. Dropping it without calling [`Self::end`] records nothing.
#[must_use = "a timer records nothing unless ended"]
#[derive(Debug)]
pub struct OperationTimer<'a> {
    monitor: &'a OperationMonitor,
    name: String,
    started: Instant,
}

impl OperationTimer<'_> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record the run and return how long it took.
    pub fn end(self) -> Duration {
        let elapsed = self.started.elapsed();
        self.monitor.record_run(self.name, elapsed);
        tracing::trace!("operation finished in {}ms", elapsed.as_millis());
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::SimulatedTimeSource;

    fn monitor() -> (OperationMonitor, Arc<SimulatedTimeSource>) {
        let clock = Arc::new(SimulatedTimeSource::default());
        (OperationMonitor::with_time_source(clock.clone()), clock)
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_records_elapsed_time() {
        let (monitor, clock) = monitor();

        let timer = monitor.start_operation("export");
        tokio::time::advance(Duration::from_millis(250)).await;
        assert_eq!(timer.end(), Duration::from_millis(250));

        let timer = monitor.start_operation("export");
        tokio::time::advance(Duration::from_millis(750)).await;
        clock.advance(1000);
        timer.end();

        let metrics = monitor.get_metrics("export").unwrap();
        assert_eq!(metrics.count, 2);
        assert_eq!(metrics.total_time_ms, 1000);
        assert!((metrics.average_time_ms - 500.0).abs() < f64::EPSILON);
        assert_eq!(metrics.last_run_ms, Some(clock.now_ms()));
    }

    #[test]
    fn test_error_rate() {
        let (monitor, _clock) = monitor();
        for _ in 0..4 {
            monitor.start_operation("login").end();
        }
        assert!(monitor.record_error("login"));

        let metrics = monitor.get_metrics("login").unwrap();
        assert_eq!(metrics.errors, 1);
        assert!((metrics.error_rate - 0.25).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_track_measures_slept_time() {
        let (monitor, clock) = monitor();

        let slept: Result<(), &str> = monitor
            .track("sleep", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert_eq!(slept, Ok(()));
        let metrics = monitor.get_metrics("sleep").unwrap();
        assert_eq!(metrics.count, 1);
        assert_eq!(metrics.total_time_ms, 5000);
        assert!((metrics.average_time_ms - 5000.0).abs() < f64::EPSILON);
        // The wall clock stamp is separate from the measured duration.
        assert_eq!(metrics.last_run_ms, Some(clock.now_ms()));
    }

    #[test]
    fn test_error_rate_is_not_capped_by_runs() {
        let (monitor, _clock) = monitor();
        monitor.start_operation("flaky").end();
        assert!(monitor.record_error("flaky"));
        assert!(monitor.record_error("flaky"));

        let metrics = monitor.get_metrics("flaky").unwrap();
        assert_eq!(metrics.count, 1);
        assert_eq!(metrics.errors, 2);
        assert!((metrics.error_rate - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_error_for_unknown_name_is_ignored() {
        let (monitor, _clock) = monitor();
        assert!(!monitor.record_error("never-started"));
        assert!(monitor.get_metrics("never-started").is_none());
        assert!(monitor.all_metrics().is_empty());
    }

    #[test]
    fn test_dropped_timer_records_nothing() {
        let (monitor, _clock) = monitor();
        let timer = monitor.start_operation("abandoned");
        drop(timer);
        assert!(monitor.get_metrics("abandoned").is_none());
    }

    #[test]
    fn test_reset_one_or_all() {
        let (monitor, _clock) = monitor();
        monitor.start_operation("a").end();
        monitor.start_operation("b").end();

        monitor.reset(Some("a"));
        assert!(monitor.get_metrics("a").is_none());
        assert!(monitor.get_metrics("b").is_some());

        monitor.reset(None);
        assert!(monitor.all_metrics().is_empty());
    }

    #[test]
    fn test_all_metrics_sorted_by_name() {
        let (monitor, _clock) = monitor();
        for name in ["upload", "auth", "download"] {
            monitor.start_operation(name).end();
        }
        let names: Vec<String> = monitor.all_metrics().into_keys().collect();
        assert_eq!(names, vec!["auth", "download", "upload"]);
    }

    #[tokio::test]
    async fn test_track_counts_failures() {
        let (monitor, _clock) = monitor();

        let ok: Result<u8, &str> = monitor.track("job", async { Ok(1) }).await;
        let err: Result<u8, &str> = monitor.track("job", async { Err("nope") }).await;

        assert_eq!(ok, Ok(1));
        assert_eq!(err, Err("nope"));
        let metrics = monitor.get_metrics("job").unwrap();
        assert_eq!(metrics.count, 2);
        assert_eq!(metrics.errors, 1);
    }

    #[tokio::test]
    async fn test_concurrent_runs_each_counted_once() {
        let monitor = Arc::new(OperationMonitor::new());

        let tasks: Vec<_> = (0..64)
            .map(|i| {
                let monitor = Arc::clone(&monitor);
                tokio::spawn(async move {
                    let timer = monitor.start_operation("shared");
                    tokio::task::yield_now().await;
                    timer.end();
                    if i % 4 == 0 {
                        monitor.record_error("shared");
                    }
                })
            })
            .collect();
        for result in futures::future::join_all(tasks).await {
            result.unwrap();
        }

        let metrics = monitor.get_metrics("shared").unwrap();
        assert_eq!(metrics.count, 64);
        assert_eq!(metrics.errors, 16);
    }
}
