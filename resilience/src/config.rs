//! Service configuration module.
//!
//! This module provides configuration loading for the diagnostics service from
//! environment variables.
//!
//! # Environment Variables
//!
//! - `RESILIENCE_LISTEN_PORT`: Port to listen on (default: `3000`)
//! - `RESILIENCE_PATTERN`: Initial latency pattern (default: `normal`)
//! - `RESILIENCE_NETWORK_CONDITION`: Network condition overlaid on the pattern (optional)
//! - `RESILIENCE_ERROR_RATE`: Error rate override in `[0, 1]` (optional)
//! - `RESILIENCE_SEED`: Seed for the simulator's random source (optional)
//!
//! # Invariants
//!
//! - `listen_port` is always a valid port number
//! - `error_rate`, when present, is a finite probability

use std::fmt;

use crate::simulation::{NetworkCondition, PatternName};

/// Service configuration.
///
/// # Post-conditions
///
/// When constructed via `from_env()`, every field has been validated; the
/// simulator can be built from it without further checks.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Port to listen on for HTTP connections.
    pub listen_port: u16,
    /// Pattern applied at startup.
    pub pattern: PatternName,
    /// Network condition overlaid after the pattern, if any.
    pub network_condition: Option<NetworkCondition>,
    /// Error rate applied last, overriding pattern and condition.
    pub error_rate: Option<f64>,
    /// Seed for reproducible runs. `None` seeds from the OS.
    pub seed: Option<u64>,
}

/// Error returned when loading or applying configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A value is present but invalid.
    InvalidValue { name: String, message: String },
    /// A pattern or network condition name is not in the registry.
    UnknownName { kind: &'static str, name: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
            Self::UnknownName { kind, name } => write!(f, "unknown {kind}: '{name}'"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl ServiceConfig {
    /// Default port for the service.
    pub const DEFAULT_PORT: u16 = 3000;
    /// Default latency pattern.
    pub const DEFAULT_PATTERN: PatternName = PatternName::Normal;

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any variable is set but cannot be parsed or is out
    /// of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// `from_env` delegates here; tests pass a map instead of mutating the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let listen_port = match lookup("RESILIENCE_LISTEN_PORT") {
            Some(value) => value.parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                name: "RESILIENCE_LISTEN_PORT".to_string(),
                message: format!("'{value}' is not a valid port number (must be 1-65535)"),
            })?,
            None => Self::DEFAULT_PORT,
        };

        let pattern = match lookup("RESILIENCE_PATTERN") {
            Some(value) => value.parse::<PatternName>().map_err(|e| invalid("RESILIENCE_PATTERN", &e))?,
            None => Self::DEFAULT_PATTERN,
        };

        let network_condition = lookup("RESILIENCE_NETWORK_CONDITION")
            .map(|value| value.parse::<NetworkCondition>())
            .transpose()
            .map_err(|e| invalid("RESILIENCE_NETWORK_CONDITION", &e))?;

        let error_rate = lookup("RESILIENCE_ERROR_RATE")
            .map(|value| parse_error_rate("RESILIENCE_ERROR_RATE", &value))
            .transpose()?;

        let seed = lookup("RESILIENCE_SEED")
            .map(|value| {
                value.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                    name: "RESILIENCE_SEED".to_string(),
                    message: format!("'{value}' is not an unsigned integer"),
                })
            })
            .transpose()?;

        Ok(Self {
            listen_port,
            pattern,
            network_condition,
            error_rate,
            seed,
        })
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_port: Self::DEFAULT_PORT,
            pattern: Self::DEFAULT_PATTERN,
            network_condition: None,
            error_rate: None,
            seed: None,
        }
    }
}

fn invalid(name: &str, error: &ConfigError) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        message: error.to_string(),
    }
}

/// Parse a probability, rejecting NaN and values outside `[0, 1]`.
pub(crate) fn parse_error_rate(name: &str, value: &str) -> Result<f64, ConfigError> {
    let rate = value.parse::<f64>().map_err(|_| ConfigError::InvalidValue {
        name: name.to_string(),
        message: format!("'{value}' is not a number"),
    })?;
    validate_error_rate(name, rate)
}

pub(crate) fn validate_error_rate(name: &str, rate: f64) -> Result<f64, ConfigError> {
    if (0.0..=1.0).contains(&rate) {
        Ok(rate)
    } else {
        Err(ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("{rate} is outside [0, 1]"),
        })
    }
}
