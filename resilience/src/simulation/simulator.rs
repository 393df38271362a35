//! The latency/error simulator.
//!
//! A [`Simulator`] owns the active configuration, a seedable random source,
//! and a clock. It is constructed explicitly and shared by reference (usually
//! behind an `Arc`); nothing here is global.
//!
//! Each simulated operation takes one snapshot of the configuration when it
//! starts, so a concurrent `set_pattern` is observed either entirely or not
//! at all by an in-flight call. Locks are never held across an await point.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::error::{ErrorKind, SimulationError};
use super::registry::{NetworkCondition, PatternName};
use super::seasonal::seasonal_multiplier_at;
use crate::config::{ConfigError, ServiceConfig, validate_error_rate};
use crate::time::{SystemTimeSource, TimeSource};

/// Probability that a login is rejected as if the credentials were wrong,
/// on top of the configured error rate.
const LOGIN_REJECTION_RATE: f64 = 0.05;
const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid email or password.";
const UPLOAD_STEPS: u8 = 10;
const PROCESSING_SUB_STEPS: u8 = 20;
/// Sub-steps (and upload steps) up to this index never fail.
const UPLOAD_SAFE_STEPS: u8 = 5;
const PROCESSING_SAFE_SUB_STEPS: u8 = 10;
const SESSION_LIFETIME_MS: u64 = 60 * 60 * 1000;

/// Active delay bounds and error rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Lower bound of the base delay, in milliseconds.
    pub min_delay_ms: u64,
    /// Upper bound of the base delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Probability of an injected failure (0.0 - 1.0).
    pub error_rate: f64,
    /// Last network condition selected.
    pub network_condition: NetworkCondition,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let normal = PatternName::Normal.pattern();
        Self {
            min_delay_ms: normal.min_delay_ms(),
            max_delay_ms: normal.max_delay_ms(),
            error_rate: normal.error_rate,
            network_condition: NetworkCondition::Fast,
        }
    }
}

impl SimulationConfig {
    /// A configuration with fixed bounds and error rate.
    #[must_use]
    pub const fn new(min_delay_ms: u64, max_delay_ms: u64, error_rate: f64) -> Self {
        Self {
            min_delay_ms,
            max_delay_ms,
            error_rate,
            network_condition: NetworkCondition::Fast,
        }
    }
}

/// Partial update applied by [`Simulator::set_config`]. `None` fields are left as-is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct SimulationConfigUpdate {
    pub min_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub error_rate: Option<f64>,
    pub network_condition: Option<NetworkCondition>,
}

/// Counters describing what a simulator has done so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SimulatorStats {
    /// Number of delays computed, custom ones included.
    pub delays: u64,
    /// Sum of all computed delays, in milliseconds.
    pub total_delay_ms: u64,
    /// Number of injected failures per kind.
    pub injected_failures: HashMap<ErrorKind, u64>,
}

impl SimulatorStats {
    /// Injected failures across all kinds.
    #[must_use]
    pub fn injected_total(&self) -> u64 {
        self.injected_failures.values().sum()
    }
}

/// A file handed to [`Simulator::simulate_file_upload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub size_bytes: u64,
}

impl UploadFile {
    #[must_use]
    pub fn new(name: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            name: name.into(),
            size_bytes,
        }
    }
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedFile {
    pub name: String,
    pub size_bytes: u64,
    pub url: String,
    pub uploaded_at_ms: u64,
}

/// Which authentication flow is being simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    Login,
    Register,
    PasswordReset,
}

/// Result of a successful authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthSession {
    pub email: String,
    pub token: String,
    pub expires_at_ms: u64,
}

/// Which notification email is being simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailKind {
    Welcome,
    PasswordReset,
    ReportReady,
    Notification,
}

#[derive(Debug, Clone, Copy)]
struct ActiveState {
    config: SimulationConfig,
    pattern: Option<PatternName>,
}

/// Latency and failure simulator.
///
/// # Thread Safety
///
/// All methods take `&self`; the configuration sits behind a `RwLock` and the
/// random source behind a `Mutex`, each held only for the duration of a
/// single read or draw.
pub struct Simulator {
    state: RwLock<ActiveState>,
    rng: Mutex<StdRng>,
    time_source: Arc<dyn TimeSource>,
    stats: Mutex<SimulatorStats>,
}

impl Simulator {
    /// Create a simulator seeded from the operating system.
    #[must_use]
    pub fn new(config: SimulationConfig) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Create a simulator whose random draws are reproducible from `seed`.
    #[must_use]
    pub fn seeded(config: SimulationConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: SimulationConfig, rng: StdRng) -> Self {
        Self {
            state: RwLock::new(ActiveState {
                config,
                pattern: None,
            }),
            rng: Mutex::new(rng),
            time_source: Arc::new(SystemTimeSource),
            stats: Mutex::new(SimulatorStats::default()),
        }
    }

    /// Replace the wall clock used for the seasonal curve and timestamps.
    #[must_use]
    pub fn with_time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    /// Build a simulator from service configuration: pattern first, then the
    /// network condition overlay, then the error rate override.
    #[must_use]
    pub fn from_service_config(config: &ServiceConfig) -> Self {
        let simulator = config.seed.map_or_else(
            || Self::new(SimulationConfig::default()),
            |seed| Self::seeded(SimulationConfig::default(), seed),
        );
        simulator.set_pattern(config.pattern);
        if let Some(condition) = config.network_condition {
            simulator.set_network_condition(condition);
        }
        if let Some(error_rate) = config.error_rate {
            simulator.write_state().config.error_rate = error_rate;
        }
        simulator
    }

    // ---------------------------------------------------------------------
    // Configuration
    // ---------------------------------------------------------------------

    /// Snapshot of the active configuration.
    #[must_use]
    pub fn config(&self) -> SimulationConfig {
        self.read_state().config
    }

    /// The pattern most recently selected with [`Self::set_pattern`], if any.
    #[must_use]
    pub fn current_pattern(&self) -> Option<PatternName> {
        self.read_state().pattern
    }

    /// Apply a partial configuration update.
    ///
    /// # Errors
    ///
    /// Rejects error rates outside `[0, 1]` and updates that would leave
    /// `min_delay_ms > max_delay_ms`. Nothing is applied on error.
    pub fn set_config(&self, update: SimulationConfigUpdate) -> Result<SimulationConfig, ConfigError> {
        let mut state = self.write_state();
        let mut next = state.config;

        if let Some(min) = update.min_delay_ms {
            next.min_delay_ms = min;
        }
        if let Some(max) = update.max_delay_ms {
            next.max_delay_ms = max;
        }
        if let Some(rate) = update.error_rate {
            next.error_rate = validate_error_rate("error_rate", rate)?;
        }
        if let Some(condition) = update.network_condition {
            next.network_condition = condition;
        }
        if next.min_delay_ms > next.max_delay_ms {
            return Err(ConfigError::InvalidValue {
                name: "min_delay_ms".to_string(),
                message: format!(
                    "{} exceeds max_delay_ms {}",
                    next.min_delay_ms, next.max_delay_ms
                ),
            });
        }

        state.config = next;
        drop(state);
        tracing::info!(
            "simulation config updated: delay={}..{}ms error_rate={}",
            next.min_delay_ms,
            next.max_delay_ms,
            next.error_rate
        );
        Ok(next)
    }

    /// Select a latency pattern, replacing the delay bounds and error rate.
    pub fn set_pattern(&self, name: PatternName) {
        let pattern = name.pattern();
        {
            let mut state = self.write_state();
            state.config.min_delay_ms = pattern.min_delay_ms();
            state.config.max_delay_ms = pattern.max_delay_ms();
            state.config.error_rate = pattern.error_rate;
            state.pattern = Some(name);
        }
        tracing::info!(
            "simulation pattern set to {name}: delay={}..{}ms error_rate={}",
            pattern.min_delay_ms(),
            pattern.max_delay_ms(),
            pattern.error_rate
        );
    }

    /// Select a latency pattern by name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownName`] for names outside the registry.
    pub fn set_pattern_by_name(&self, name: &str) -> Result<PatternName, ConfigError> {
        let pattern = name.parse::<PatternName>()?;
        self.set_pattern(pattern);
        Ok(pattern)
    }

    /// Overlay a network condition's delay bounds and error rate.
    pub fn set_network_condition(&self, condition: NetworkCondition) {
        let preset = condition.preset();
        {
            let mut state = self.write_state();
            state.config.min_delay_ms = preset.min_delay_ms;
            state.config.max_delay_ms = preset.max_delay_ms;
            state.config.error_rate = preset.error_rate;
            state.config.network_condition = condition;
        }
        tracing::info!(
            "network condition set to {condition}: delay={}..{}ms error_rate={}",
            preset.min_delay_ms,
            preset.max_delay_ms,
            preset.error_rate
        );
    }

    /// Select a network condition by name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownName`] for names outside the registry.
    pub fn set_network_condition_by_name(&self, name: &str) -> Result<NetworkCondition, ConfigError> {
        let condition = name.parse::<NetworkCondition>()?;
        self.set_network_condition(condition);
        Ok(condition)
    }

    /// Snapshot of the simulator's counters.
    #[must_use]
    pub fn stats(&self) -> SimulatorStats {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Reset the simulator's counters.
    pub fn reset_stats(&self) {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner) = SimulatorStats::default();
    }

    // ---------------------------------------------------------------------
    // Delays
    // ---------------------------------------------------------------------

    /// Compute how long [`Self::delay`] would wait, without waiting.
    ///
    /// A `custom` delay is returned unchanged, though still counted in
    /// [`SimulatorStats`]. Otherwise the base delay is
    /// drawn uniformly from the active bounds (or from `pattern_override`'s
    /// bounds), scaled by the seasonal multiplier and a jitter factor in
    /// `[0.9, 1.1]`, and rounded to the nearest millisecond.
    #[must_use]
    pub fn compute_delay(
        &self,
        custom: Option<Duration>,
        pattern_override: Option<PatternName>,
    ) -> Duration {
        let config = self.config();
        self.compute_delay_from(&config, custom, pattern_override)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn compute_delay_from(
        &self,
        config: &SimulationConfig,
        custom: Option<Duration>,
        pattern_override: Option<PatternName>,
    ) -> Duration {
        if let Some(custom) = custom {
            self.record_delay(duration_ms(custom));
            return custom;
        }

        let (min, max) = pattern_override.map_or(
            (config.min_delay_ms, config.max_delay_ms),
            |name| (name.pattern().min_delay_ms(), name.pattern().max_delay_ms()),
        );
        let (low, high) = if min <= max { (min, max) } else { (max, min) };

        let seasonal = seasonal_multiplier_at(self.time_source.now_ms());
        let (base, jitter) = {
            let mut rng = self.rng();
            let base = rng.random_range(low as f64..=high as f64);
            (base, rng.random_range(0.9..=1.1))
        };

        let delay_ms = (base * seasonal * jitter).round().max(0.0) as u64;
        self.record_delay(delay_ms);
        tracing::debug!(
            "computed delay {delay_ms}ms (base={base:.0}ms seasonal={seasonal:.2} jitter={jitter:.2})"
        );
        Duration::from_millis(delay_ms)
    }

    /// Wait for a simulated latency. Returns the time waited.
    pub async fn delay(
        &self,
        custom: Option<Duration>,
        pattern_override: Option<PatternName>,
    ) -> Duration {
        let delay = self.compute_delay(custom, pattern_override);
        tokio::time::sleep(delay).await;
        delay
    }

    // ---------------------------------------------------------------------
    // Simulated operations
    // ---------------------------------------------------------------------

    /// Wait for a simulated latency, then either fail with an injected
    /// error of `kind` or run `operation` and return its result untouched.
    pub async fn simulate_operation<T, E, F, Fut>(&self, operation: F, kind: ErrorKind) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<SimulationError>,
    {
        let config = self.config();
        let delay = self.compute_delay_from(&config, None, None);
        tokio::time::sleep(delay).await;

        if self.roll(config.error_rate) {
            return Err(self.inject(kind).into());
        }
        operation().await
    }

    /// Simulate a file upload in ten equal steps.
    ///
    /// `on_progress` receives 0, 10, ..., 100 (eleven reports). Each step after
    /// the fifth fails independently with twice the configured error rate.
    pub async fn simulate_file_upload(
        &self,
        file: &UploadFile,
        mut on_progress: impl FnMut(u8) + Send,
    ) -> Result<UploadedFile, SimulationError> {
        let config = self.config();
        let step = self.compute_delay_from(&config, None, None) / u32::from(UPLOAD_STEPS);

        for index in 0..=UPLOAD_STEPS {
            tokio::time::sleep(step).await;
            if index > UPLOAD_SAFE_STEPS && self.roll(2.0 * config.error_rate) {
                return Err(self.inject(ErrorKind::Upload));
            }
            on_progress(index * (100 / UPLOAD_STEPS));
        }

        let id = self.rng().random::<u64>();
        tracing::debug!("simulated upload of '{}' ({} bytes)", file.name, file.size_bytes);
        Ok(UploadedFile {
            name: file.name.clone(),
            size_bytes: file.size_bytes,
            url: format!("https://files.simulated.local/uploads/{id:016x}/{}", file.name),
            uploaded_at_ms: self.time_source.now_ms(),
        })
    }

    /// Simulate a multi-step processing job.
    ///
    /// Each step runs 20 sub-steps over a duration drawn from
    /// `[2000, 10000]` ms and reports `(step_index, percent)` after each.
    /// Sub-steps past the tenth fail independently at the configured rate;
    /// the failure message names the step.
    pub async fn simulate_processing<S: AsRef<str> + Sync>(
        &self,
        steps: &[S],
        mut on_step_update: impl FnMut(usize, u8) + Send,
    ) -> Result<(), SimulationError> {
        let config = self.config();

        for (index, step) in steps.iter().enumerate() {
            let duration = Duration::from_millis(self.draw_ms(2000, 10_000));
            self.record_delay(duration_ms(duration));
            let sub_step = duration / u32::from(PROCESSING_SUB_STEPS);

            for sub in 1..=PROCESSING_SUB_STEPS {
                tokio::time::sleep(sub_step).await;
                if sub > PROCESSING_SAFE_SUB_STEPS && self.roll(config.error_rate) {
                    let step = step.as_ref();
                    let error = {
                        let mut rng = self.rng();
                        let detail = ErrorKind::Processing.pick_message(&mut *rng);
                        SimulationError::with_message(
                            ErrorKind::Processing,
                            format!("Step '{step}' failed: {detail}"),
                            &mut *rng,
                        )
                    };
                    return Err(self.record_injected(error));
                }
                on_step_update(index, sub * (100 / PROCESSING_SUB_STEPS));
            }
        }

        Ok(())
    }

    /// Simulate downloading a generated file.
    ///
    /// Waits `size_bytes / 1000` ms clamped to `[500, 3000]`, then fails at
    /// the configured rate or returns a locator ending in `.<file_type>`.
    pub async fn simulate_download(
        &self,
        file_type: &str,
        size_bytes: u64,
    ) -> Result<String, SimulationError> {
        let config = self.config();
        let wait_ms = (size_bytes / 1000).clamp(500, 3000);
        self.record_delay(wait_ms);
        tokio::time::sleep(Duration::from_millis(wait_ms)).await;

        if self.roll(config.error_rate) {
            return Err(self.inject(ErrorKind::Download));
        }

        let extension = file_type.trim_start_matches('.').to_ascii_lowercase();
        let id = self.rng().random::<u64>();
        Ok(format!(
            "https://files.simulated.local/downloads/{id:016x}.{extension}"
        ))
    }

    /// Simulate an authentication round trip.
    ///
    /// Malformed input fails immediately with a non-retryable validation
    /// error. Otherwise waits 1000-3000 ms; logins are rejected 5% of the time
    /// with an invalid-credentials message, and every kind fails at the
    /// configured rate.
    pub async fn simulate_auth(
        &self,
        email: &str,
        password: &str,
        kind: AuthKind,
    ) -> Result<AuthSession, SimulationError> {
        if !email.contains('@') || email.trim().len() < 3 || password.is_empty() {
            return Err(SimulationError::with_message(
                ErrorKind::Validation,
                "A valid email address and password are required.",
                &mut *self.rng(),
            ));
        }

        let config = self.config();
        let wait_ms = self.draw_ms(1000, 3000);
        self.record_delay(wait_ms);
        tokio::time::sleep(Duration::from_millis(wait_ms)).await;

        if kind == AuthKind::Login && self.roll(LOGIN_REJECTION_RATE) {
            let error = SimulationError::with_message(
                ErrorKind::Auth,
                INVALID_CREDENTIALS_MESSAGE,
                &mut *self.rng(),
            );
            return Err(self.record_injected(error));
        }
        if self.roll(config.error_rate) {
            return Err(self.inject(ErrorKind::Auth));
        }

        let token = self.rng().random::<u128>();
        Ok(AuthSession {
            email: email.to_string(),
            token: format!("sim_{token:032x}"),
            expires_at_ms: self.time_source.now_ms().saturating_add(SESSION_LIFETIME_MS),
        })
    }

    /// Simulate sending a notification email. Waits 1500-4500 ms and fails
    /// at half the configured rate. Returns a synthetic message id.
    pub async fn simulate_email_send(&self, kind: EmailKind) -> Result<String, SimulationError> {
        let config = self.config();
        let wait_ms = self.draw_ms(1500, 4500);
        self.record_delay(wait_ms);
        tokio::time::sleep(Duration::from_millis(wait_ms)).await;

        if self.roll(config.error_rate / 2.0) {
            return Err(self.inject(ErrorKind::Network));
        }

        let id = self.rng().random::<u64>();
        tracing::debug!("simulated {kind:?} email sent");
        Ok(format!("msg_{id:016x}"))
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, ActiveState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, ActiveState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true with the given probability. Rates at or below zero
    /// never fire, rates at or above one always do.
    fn roll(&self, probability: f64) -> bool {
        if probability <= 0.0 {
            return false;
        }
        self.rng().random::<f64>() < probability
    }

    fn draw_ms(&self, low: u64, high: u64) -> u64 {
        self.rng().random_range(low..=high)
    }

    fn inject(&self, kind: ErrorKind) -> SimulationError {
        let error = SimulationError::random(kind, &mut *self.rng());
        self.record_injected(error)
    }

    fn record_injected(&self, error: SimulationError) -> SimulationError {
        *self
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .injected_failures
            .entry(error.kind())
            .or_insert(0) += 1;
        tracing::warn!("injected {} failure: {error}", error.kind());
        error
    }

    fn record_delay(&self, delay_ms: u64) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.delays += 1;
        stats.total_delay_ms = stats.total_delay_ms.saturating_add(delay_ms);
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("config", &self.config())
            .field("pattern", &self.current_pattern())
            .finish_non_exhaustive()
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis() as u64
}
