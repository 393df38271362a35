//! Crate-level error type.
//!
//! [`Error`] is the single type that flows through a full call chain
//! (simulator inside circuit breaker inside retry), so each layer can hand
//! its own failure to the next without wrapping the others.

use std::fmt;

use crate::circuit_breaker::CircuitBreakerError;
use crate::config::ConfigError;
use crate::simulation::{ErrorKind, SimulationError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A classified, simulated failure.
    Simulation(SimulationError),
    /// A circuit breaker refused or abandoned the call.
    CircuitBreaker(CircuitBreakerError),
    /// Invalid configuration.
    Config(ConfigError),
}

impl Error {
    /// The failure category, for simulated failures only.
    #[must_use]
    pub const fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Simulation(e) => Some(e.kind()),
            Self::CircuitBreaker(_) | Self::Config(_) => None,
        }
    }

    /// Only classified simulation failures can be retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Simulation(e) => e.is_retryable(),
            Self::CircuitBreaker(_) | Self::Config(_) => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simulation(e) => write!(f, "simulated {} failure: {e}", e.kind()),
            Self::CircuitBreaker(e) => write!(f, "{e}"),
            Self::Config(e) => write!(f, "configuration error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Simulation(e) => Some(e),
            Self::CircuitBreaker(e) => Some(e),
            Self::Config(e) => Some(e),
        }
    }
}

impl From<SimulationError> for Error {
    fn from(e: SimulationError) -> Self {
        Self::Simulation(e)
    }
}

impl From<CircuitBreakerError> for Error {
    fn from(e: CircuitBreakerError) -> Self {
        Self::CircuitBreaker(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}
