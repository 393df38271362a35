//! Retries stop as soon as the breaker opens, and the breaker recovers once
//! the backend does.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::circuit_breaker::{CircuitBreakerError, CircuitState};
use crate::e2e_tests::helpers::breaker_with_clock;
use crate::error::Error;
use crate::retry::{RetryConfig, with_retry};
use crate::simulation::{ErrorKind, SimulationConfig, SimulationConfigUpdate};
use crate::testing::simulator_with;

#[tokio::test(start_paused = true)]
async fn test_open_breaker_cuts_retries_short() {
    let simulator = simulator_with(SimulationConfig::new(10, 20, 1.0), 31);
    let (breaker, clock) = breaker_with_clock(2, Duration::from_secs(30));
    let retry = RetryConfig::default()
        .with_base_delay(Duration::from_millis(50))
        .with_max_attempts(5)
        .unwrap();
    let invoked = AtomicU32::new(0);

    let call = || {
        breaker.execute(|| {
            simulator.simulate_operation(
                || async {
                    invoked.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Error>("report.pdf")
                },
                ErrorKind::Processing,
            )
        })
    };

    let result = with_retry(call, &retry).await;
    assert_eq!(result, Err(Error::CircuitBreaker(CircuitBreakerError::Open)));
    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(simulator.stats().injected_total(), 2);
    assert_eq!(invoked.load(Ordering::SeqCst), 0);

    // The backend heals and the reset timeout passes.
    simulator
        .set_config(SimulationConfigUpdate {
            error_rate: Some(0.0),
            ..SimulationConfigUpdate::default()
        })
        .unwrap();
    clock.advance(30_001);

    let result = with_retry(call, &retry).await;
    assert_eq!(result, Ok("report.pdf"));
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(invoked.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_auth_failures_are_not_retried() {
    let simulator = simulator_with(SimulationConfig::new(10, 20, 1.0), 5);
    let (breaker, _clock) = breaker_with_clock(10, Duration::from_secs(30));
    let attempts = AtomicU32::new(0);

    let result: Result<(), Error> = with_retry(
        || {
            attempts.fetch_add(1, Ordering::SeqCst);
            breaker.execute(|| {
                simulator.simulate_operation(|| async { Ok::<(), Error>(()) }, ErrorKind::Auth)
            })
        },
        &RetryConfig::default(),
    )
    .await;

    assert_eq!(result.unwrap_err().kind(), Some(ErrorKind::Auth));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(breaker.failures(), 1);
}
