//! HTTP diagnostics service.
//!
//! Exposes the simulator's configuration, the monitor's metrics, and the
//! per-kind circuit breakers, and lets a client drive simulated operations
//! through the full breaker + retry + monitor chain:
//!
//! | Method | Path                        | Purpose                               |
//! |--------|-----------------------------|---------------------------------------|
//! | GET    | `/config`                   | Active configuration and counters     |
//! | PUT    | `/config`                   | Partial configuration update          |
//! | PUT    | `/config/pattern/{name}`    | Select a latency pattern              |
//! | PUT    | `/config/network/{name}`    | Select a network condition            |
//! | GET    | `/metrics`                  | All operation metrics                 |
//! | GET    | `/metrics/{name}`           | One operation's metrics               |
//! | DELETE | `/metrics`                  | Clear all metrics                     |
//! | GET    | `/breakers`                 | Circuit breaker states                |
//! | DELETE | `/breakers`                 | Close every breaker                   |
//! | POST   | `/simulate/{kind}`          | Run one simulated operation           |

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;

use crate::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerStats, DEFAULT_TIMEOUT,
};
use crate::config::ConfigError;
use crate::error::Error;
use crate::monitor::{MetricsSnapshot, OperationMonitor};
use crate::retry::{RetryConfig, with_retry_reporting_rng};
use crate::simulation::{
    ErrorKind, PatternName, SimulationConfig, SimulationConfigUpdate, Simulator, SimulatorStats,
};
use crate::time::{SystemTimeSource, TimeSource};

/// Shared state for the diagnostics handlers.
#[derive(Clone)]
pub struct AppState {
    simulator: Arc<Simulator>,
    monitor: Arc<OperationMonitor>,
    /// One breaker per operation kind, created up front.
    breakers: Arc<HashMap<ErrorKind, CircuitBreaker>>,
    retry: Arc<RetryConfig>,
    time_source: Arc<dyn TimeSource>,
}

impl AppState {
    /// State on the wall clock, with default retry and breaker policies.
    #[must_use]
    pub fn new(simulator: Arc<Simulator>) -> Self {
        Self::with_time_source(simulator, Arc::new(SystemTimeSource))
    }

    #[must_use]
    pub fn with_time_source(simulator: Arc<Simulator>, time_source: Arc<dyn TimeSource>) -> Self {
        let breaker_config = CircuitBreakerConfig::default().with_timeout(DEFAULT_TIMEOUT);
        Self {
            simulator,
            monitor: Arc::new(OperationMonitor::with_time_source(Arc::clone(&time_source))),
            breakers: Arc::new(build_breakers(breaker_config, &time_source)),
            retry: Arc::new(RetryConfig::default()),
            time_source,
        }
    }

    /// Replace every breaker with a fresh one using `config`.
    #[must_use]
    pub fn with_breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.breakers = Arc::new(build_breakers(config, &self.time_source));
        self
    }

    #[must_use]
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = Arc::new(retry);
        self
    }

    #[must_use]
    pub fn monitor(&self) -> &OperationMonitor {
        &self.monitor
    }
}

fn build_breakers(
    config: CircuitBreakerConfig,
    time_source: &Arc<dyn TimeSource>,
) -> HashMap<ErrorKind, CircuitBreaker> {
    ErrorKind::ALL
        .into_iter()
        .map(|kind| {
            let breaker = CircuitBreaker::with_time_source(
                format!("simulate.{kind}"),
                config,
                Arc::clone(time_source),
            );
            (kind, breaker)
        })
        .collect()
}

/// Build the diagnostics router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/config", get(get_config).put(put_config))
        .route("/config/pattern/{name}", put(put_pattern))
        .route("/config/network/{name}", put(put_network))
        .route("/metrics", get(get_metrics).delete(delete_metrics))
        .route("/metrics/{name}", get(get_metric))
        .route("/breakers", get(get_breakers).delete(reset_breakers))
        .route("/simulate/{kind}", post(post_simulate))
        .with_state(state)
}

/// An error reply: a status code and a JSON `{"error": ...}` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ConfigError> for ApiError {
    fn from(e: ConfigError) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: e.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigView {
    pub config: SimulationConfig,
    pub pattern: Option<PatternName>,
    pub stats: SimulatorStats,
}

async fn get_config(State(state): State<AppState>) -> Json<ConfigView> {
    Json(ConfigView {
        config: state.simulator.config(),
        pattern: state.simulator.current_pattern(),
        stats: state.simulator.stats(),
    })
}

async fn put_config(
    State(state): State<AppState>,
    Json(update): Json<SimulationConfigUpdate>,
) -> Result<Json<SimulationConfig>, ApiError> {
    Ok(Json(state.simulator.set_config(update)?))
}

async fn put_pattern(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.simulator.set_pattern_by_name(&name)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn put_network(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.simulator.set_network_condition_by_name(&name)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_metrics(State(state): State<AppState>) -> Json<BTreeMap<String, MetricsSnapshot>> {
    Json(state.monitor.all_metrics())
}

async fn get_metric(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<MetricsSnapshot>, ApiError> {
    state
        .monitor
        .get_metrics(&name)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("no metrics recorded for '{name}'")))
}

async fn delete_metrics(State(state): State<AppState>) -> StatusCode {
    state.monitor.reset(None);
    StatusCode::NO_CONTENT
}

async fn get_breakers(
    State(state): State<AppState>,
) -> Json<BTreeMap<&'static str, CircuitBreakerStats>> {
    Json(
        state
            .breakers
            .iter()
            .map(|(kind, breaker)| (kind.as_str(), breaker.stats()))
            .collect(),
    )
}

async fn reset_breakers(State(state): State<AppState>) -> StatusCode {
    for breaker in state.breakers.values() {
        breaker.reset();
    }
    StatusCode::NO_CONTENT
}

/// Body of a `POST /simulate/{kind}` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulateResponse {
    pub kind: ErrorKind,
    pub ok: bool,
    /// How many times the operation was attempted.
    pub attempts: u32,
    pub retry_delay_ms: u64,
    pub elapsed_ms: u64,
    pub error: Option<FailureBody>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureBody {
    pub kind: Option<ErrorKind>,
    pub code: Option<String>,
    pub message: String,
    pub retryable: bool,
}

impl From<&Error> for FailureBody {
    fn from(error: &Error) -> Self {
        match error {
            Error::Simulation(e) => Self {
                kind: Some(e.kind()),
                code: Some(e.code().to_string()),
                message: e.message().to_string(),
                retryable: e.is_retryable(),
            },
            other => Self {
                kind: None,
                code: None,
                message: other.to_string(),
                retryable: other.is_retryable(),
            },
        }
    }
}

const fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::Simulation(_) => StatusCode::BAD_GATEWAY,
        Error::CircuitBreaker(CircuitBreakerError::Open) => StatusCode::SERVICE_UNAVAILABLE,
        Error::CircuitBreaker(CircuitBreakerError::TimedOut(_)) => StatusCode::GATEWAY_TIMEOUT,
        Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[allow(clippy::cast_possible_truncation)]
async fn post_simulate(
    State(state): State<AppState>,
    Path(kind): Path<ErrorKind>,
) -> (StatusCode, Json<SimulateResponse>) {
    let name = format!("simulate.{kind}");
    let simulator = state.simulator.as_ref();
    let Some(breaker) = state.breakers.get(&kind) else {
        tracing::error!("no circuit breaker registered for {kind}");
        let response = SimulateResponse {
            kind,
            ok: false,
            attempts: 0,
            retry_delay_ms: 0,
            elapsed_ms: 0,
            error: None,
        };
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(response));
    };

    let timer = state.monitor.start_operation(name.as_str());
    let mut rng = StdRng::from_os_rng();
    let outcome = with_retry_reporting_rng(
        move || {
            breaker.execute(move || {
                simulator.simulate_operation(|| async { Ok::<(), Error>(()) }, kind)
            })
        },
        &state.retry,
        &mut rng,
    )
    .await;
    let elapsed = timer.end();

    let (status, error) = match &outcome.result {
        Ok(()) => (StatusCode::OK, None),
        Err(e) => {
            state.monitor.record_error(&name);
            tracing::debug!("simulated {kind} operation failed: {e}");
            (status_for(e), Some(FailureBody::from(e)))
        }
    };

    let response = SimulateResponse {
        kind,
        ok: error.is_none(),
        attempts: outcome.attempts,
        retry_delay_ms: outcome.total_delay.as_millis() as u64,
        elapsed_ms: elapsed.as_millis() as u64,
        error,
    };
    (status, Json(response))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::circuit_breaker::CircuitState;
    use crate::testing::simulator_with;
    use crate::time::SimulatedTimeSource;

    fn state(config: SimulationConfig) -> AppState {
        let simulator = Arc::new(simulator_with(config, 7));
        AppState::with_time_source(simulator, Arc::new(SimulatedTimeSource::default()))
            .with_retry_config(RetryConfig::default().with_base_delay(Duration::from_millis(10)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_simulation_is_recorded() {
        let state = state(SimulationConfig::new(0, 0, 0.0));

        let (status, Json(body)) =
            post_simulate(State(state.clone()), Path(ErrorKind::Upload)).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.ok);
        assert_eq!(body.attempts, 1);
        assert_eq!(body.error, None);

        let metrics = state.monitor().get_metrics("simulate.upload").unwrap();
        assert_eq!(metrics.count, 1);
        assert_eq!(metrics.errors, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_exhaust_retries_then_open_breaker() {
        let state = state(SimulationConfig::new(0, 0, 1.0));

        // Three retryable failures.
        let (status, Json(body)) =
            post_simulate(State(state.clone()), Path(ErrorKind::Network)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body.attempts, 3);
        let error = body.error.unwrap();
        assert_eq!(error.kind, Some(ErrorKind::Network));
        assert!(error.retryable);
        assert!(error.code.unwrap().starts_with("SIM_NETWORK_"));

        // Failures four and five open the breaker; the third attempt is refused.
        let (status, Json(body)) =
            post_simulate(State(state.clone()), Path(ErrorKind::Network)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.attempts, 3);

        // Refusals are not retried.
        let (status, Json(body)) =
            post_simulate(State(state.clone()), Path(ErrorKind::Network)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.attempts, 1);
        assert!(!body.error.unwrap().retryable);

        let breaker = &state.breakers[&ErrorKind::Network];
        assert_eq!(breaker.state(), CircuitState::Open);
        // Other kinds have their own breaker.
        assert_eq!(state.breakers[&ErrorKind::Upload].state(), CircuitState::Closed);

        let metrics = state.monitor().get_metrics("simulate.network").unwrap();
        assert_eq!(metrics.count, 3);
        assert_eq!(metrics.errors, 3);

        assert_eq!(reset_breakers(State(state.clone())).await, StatusCode::NO_CONTENT);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_kind_fails_once() {
        let state = state(SimulationConfig::new(0, 0, 1.0));

        let (status, Json(body)) =
            post_simulate(State(state.clone()), Path(ErrorKind::Validation)).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body.attempts, 1);
        assert!(!body.error.unwrap().retryable);
    }

    #[tokio::test]
    async fn test_pattern_and_network_updates() {
        let state = state(SimulationConfig::default());

        let status = put_pattern(State(state.clone()), Path("slow".to_string()))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        let Json(view) = get_config(State(state.clone())).await;
        assert_eq!(view.pattern, Some(PatternName::Slow));
        assert_eq!(view.config.max_delay_ms, 3000);

        let error = put_network(State(state.clone()), Path("carrier-pigeon".to_string()))
            .await
            .unwrap_err();
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);

        let status = put_network(State(state.clone()), Path("unstable".to_string()))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(state.simulator.config().max_delay_ms, 5000);
    }

    #[tokio::test]
    async fn test_put_config_validates() {
        let state = state(SimulationConfig::new(100, 200, 0.0));

        let error = put_config(
            State(state.clone()),
            Json(SimulationConfigUpdate {
                error_rate: Some(2.0),
                ..SimulationConfigUpdate::default()
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);

        let Json(config) = put_config(
            State(state),
            Json(SimulationConfigUpdate {
                min_delay_ms: Some(50),
                ..SimulationConfigUpdate::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(config.min_delay_ms, 50);
    }

    #[tokio::test]
    async fn test_metrics_endpoints() {
        let state = state(SimulationConfig::default());
        state.monitor().start_operation("export").end();

        let Json(all) = get_metrics(State(state.clone())).await;
        assert_eq!(all.len(), 1);

        let Json(one) = get_metric(State(state.clone()), Path("export".to_string()))
            .await
            .unwrap();
        assert_eq!(one.count, 1);

        let missing = get_metric(State(state.clone()), Path("import".to_string()))
            .await
            .unwrap_err();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        assert_eq!(delete_metrics(State(state.clone())).await, StatusCode::NO_CONTENT);
        let Json(all) = get_metrics(State(state)).await;
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn test_breaker_listing_covers_every_kind() {
        let state = state(SimulationConfig::default());
        let Json(breakers) = get_breakers(State(state)).await;
        assert_eq!(breakers.len(), ErrorKind::ALL.len());
        assert!(breakers.values().all(|stats| stats.state == CircuitState::Closed));
    }
}
