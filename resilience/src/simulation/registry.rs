//! Built-in latency patterns and network condition presets.
//!
//! Both tables are closed: the set of names is fixed at compile time, and the
//! string-facing API ([`FromStr`]) reports unknown names as
//! [`ConfigError::UnknownName`] rather than silently ignoring them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Name of a built-in latency pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternName {
    Instant,
    Fast,
    Normal,
    Slow,
    Heavy,
}

impl PatternName {
    /// All patterns, fastest first.
    pub const ALL: [Self; 5] = [
        Self::Instant,
        Self::Fast,
        Self::Normal,
        Self::Slow,
        Self::Heavy,
    ];

    /// The lowercase identifier used in configuration and URLs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Instant => "instant",
            Self::Fast => "fast",
            Self::Normal => "normal",
            Self::Slow => "slow",
            Self::Heavy => "heavy",
        }
    }

    /// The preset this name refers to.
    #[must_use]
    pub const fn pattern(self) -> &'static SimulationPattern {
        match self {
            Self::Instant => &INSTANT,
            Self::Fast => &FAST,
            Self::Normal => &NORMAL,
            Self::Slow => &SLOW,
            Self::Heavy => &HEAVY,
        }
    }
}

impl fmt::Display for PatternName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatternName {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::UnknownName {
                kind: "pattern",
                name: s.to_string(),
            })
    }
}

/// An immutable latency/error-rate preset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimulationPattern {
    /// Display name.
    pub name: &'static str,
    /// Nominal delay in milliseconds.
    pub base_delay_ms: u64,
    /// Multiplier (>= 0) widening the delay range above `base_delay_ms`.
    pub variability: f64,
    /// Probability of an injected failure (0.0 - 1.0).
    pub error_rate: f64,
    /// Human-readable summary for diagnostics.
    pub description: &'static str,
}

impl SimulationPattern {
    /// Lower delay bound derived from this pattern: half the base delay.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn min_delay_ms(&self) -> u64 {
        (self.base_delay_ms as f64 * 0.5).round() as u64
    }

    /// Upper delay bound derived from this pattern: `base * (1 + variability)`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn max_delay_ms(&self) -> u64 {
        (self.base_delay_ms as f64 * (1.0 + self.variability.max(0.0))).round() as u64
    }
}

const INSTANT: SimulationPattern = SimulationPattern {
    name: "Instant",
    base_delay_ms: 100,
    variability: 0.1,
    error_rate: 0.001,
    description: "Near-instant responses for quick UI iteration",
};

const FAST: SimulationPattern = SimulationPattern {
    name: "Fast",
    base_delay_ms: 300,
    variability: 0.3,
    error_rate: 0.01,
    description: "A healthy backend on a good connection",
};

const NORMAL: SimulationPattern = SimulationPattern {
    name: "Normal",
    base_delay_ms: 800,
    variability: 0.5,
    error_rate: 0.02,
    description: "Typical production latency with occasional failures",
};

const SLOW: SimulationPattern = SimulationPattern {
    name: "Slow",
    base_delay_ms: 2000,
    variability: 0.5,
    error_rate: 0.05,
    description: "An overloaded backend",
};

const HEAVY: SimulationPattern = SimulationPattern {
    name: "Heavy",
    base_delay_ms: 5000,
    variability: 1.0,
    error_rate: 0.1,
    description: "Degraded service under heavy load",
};

/// Name of a network condition preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkCondition {
    Fast,
    Slow,
    Unstable,
}

impl NetworkCondition {
    pub const ALL: [Self; 3] = [Self::Fast, Self::Slow, Self::Unstable];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Slow => "slow",
            Self::Unstable => "unstable",
        }
    }

    /// Delay bounds and error rate applied when this condition is selected.
    #[must_use]
    pub const fn preset(self) -> ConditionPreset {
        match self {
            Self::Fast => ConditionPreset {
                min_delay_ms: 100,
                max_delay_ms: 500,
                error_rate: 0.01,
            },
            Self::Slow => ConditionPreset {
                min_delay_ms: 1000,
                max_delay_ms: 3000,
                error_rate: 0.05,
            },
            Self::Unstable => ConditionPreset {
                min_delay_ms: 500,
                max_delay_ms: 5000,
                error_rate: 0.15,
            },
        }
    }
}

impl fmt::Display for NetworkCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkCondition {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|condition| condition.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::UnknownName {
                kind: "network condition",
                name: s.to_string(),
            })
    }
}

/// Delay bounds and error rate for a [`NetworkCondition`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConditionPreset {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub error_rate: f64,
}
