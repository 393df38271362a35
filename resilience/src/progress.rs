//! Simulated progress reporting.
//!
//! A [`ProgressSimulator`] advances a percentage from 0 to 100 in equal
//! increments on a background task, invoking a callback after each tick.
//!
//! # Design
//!
//! The ticking task is spawned with `tokio::spawn` and owns clones of the
//! shared progress value and callbacks. The simulator keeps only the
//! `JoinHandle`; stopping (or dropping) the simulator aborts the task, so
//! no new tick starts after `stop` returns. A tick already running on
//! another worker may still deliver its callback.
//!
//! Every `start` sweeps from 0; `set_progress` is the only way to jump.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

pub const DEFAULT_STEPS: u32 = 50;

/// Called with the rounded percentage after every tick.
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;
/// Called once when progress reaches 100.
pub type CompletionCallback = Arc<dyn Fn() + Send + Sync>;

/// Configuration for a progress run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressConfig {
    /// Nominal time from 0 to 100.
    pub duration: Duration,
    /// Number of equal increments. Always at least 1.
    pub steps: u32,
}

impl ProgressConfig {
    #[must_use]
    pub const fn new(duration: Duration) -> Self {
        Self {
            duration,
            steps: DEFAULT_STEPS,
        }
    }

    #[must_use]
    pub const fn with_steps(mut self, steps: u32) -> Self {
        self.steps = if steps == 0 { 1 } else { steps };
        self
    }

    /// Time between ticks. Never zero, since `tokio::time::interval` rejects it.
    fn period(&self) -> Duration {
        (self.duration / self.steps.max(1)).max(Duration::from_millis(1))
    }
}

/// Drives a percentage from 0 to 100 on a background task.
///
/// # Invariants
///
/// - At most one ticking task is alive; starting again stops the previous one.
/// - Reported values never leave `[0, 100]`, and a sweep is non-decreasing.
/// - `on_complete` fires once per sweep that reaches 100.
///
/// # Thread Safety
///
/// The progress value lives behind an `Arc<Mutex<f64>>` shared with the
/// task; callbacks must be `Send + Sync` as they run on the runtime.
pub struct ProgressSimulator {
    progress: Arc<Mutex<f64>>,
    on_progress: ProgressCallback,
    on_complete: Option<CompletionCallback>,
    task: Option<JoinHandle<()>>,
}

impl ProgressSimulator {
    #[must_use]
    pub fn new(on_progress: impl Fn(u8) + Send + Sync + 'static) -> Self {
        Self {
            progress: Arc::new(Mutex::new(0.0)),
            on_progress: Arc::new(on_progress),
            on_complete: None,
            task: None,
        }
    }

    #[must_use]
    pub fn with_on_complete(mut self, on_complete: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Arc::new(on_complete));
        self
    }

    /// Start a sweep from 0 with the default step count.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&mut self, duration: Duration) {
        self.start_with(ProgressConfig::new(duration));
    }

    /// Start a sweep from 0. A run already in progress is stopped first.
    pub fn start_with(&mut self, config: ProgressConfig) {
        self.stop();
        *self.progress.lock().unwrap_or_else(PoisonError::into_inner) = 0.0;
        let config = config.with_steps(config.steps);
        tracing::debug!(
            "progress started: {} steps over {}ms",
            config.steps,
            config.duration.as_millis()
        );
        self.task = Some(spawn_progress_task(
            Arc::clone(&self.progress),
            Arc::clone(&self.on_progress),
            self.on_complete.clone(),
            config,
        ));
    }

    /// Cancel the ticking task. Idempotent; progress keeps its current value.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Whether a ticking task is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Jump to an explicit percentage (clamped to `[0, 100]`) and report it.
    pub fn set_progress(&self, progress: f64) {
        let progress = if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 100.0)
        };
        *self.progress.lock().unwrap_or_else(PoisonError::into_inner) = progress;
        (self.on_progress)(to_percent(progress));
    }

    #[must_use]
    pub fn current_progress(&self) -> f64 {
        *self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ProgressSimulator {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ProgressSimulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSimulator")
            .field("progress", &self.current_progress())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// Spawn the ticking task.
///
/// Each tick adds `100 / steps` to the shared progress and reports it; the
/// final tick lands exactly on 100, fires `on_complete`, and ends the task.
fn spawn_progress_task(
    progress: Arc<Mutex<f64>>,
    on_progress: ProgressCallback,
    on_complete: Option<CompletionCallback>,
    config: ProgressConfig,
) -> JoinHandle<()> {
    let increment = 100.0 / f64::from(config.steps);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.period());
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let current = {
                let mut value = progress.lock().unwrap_or_else(PoisonError::into_inner);
                let next = *value + increment;
                // Snap float drift on the last increment.
                *value = if next >= 100.0 - 1e-9 { 100.0 } else { next };
                *value
            };

            on_progress(to_percent(current));
            if current >= 100.0 {
                if let Some(on_complete) = &on_complete {
                    on_complete();
                }
                tracing::debug!("progress complete");
                break;
            }
        }
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
const fn to_percent(progress: f64) -> u8 {
    progress.round().clamp(0.0, 100.0) as u8
}
