//! Latency and failure simulation.
//!
//! This module stands in for a real backend:
//! - Named latency patterns and network condition presets
//! - A load curve that follows the local time of day and day of week
//! - Typed, classified failures injected at a configurable rate
//! - Staged operations (uploads, processing jobs) that report progress
//!
//! # Usage
//!
//! ```ignore
//! use resilience::simulation::{ErrorKind, PatternName, SimulationConfig, Simulator};
//!
//! let simulator = Simulator::seeded(SimulationConfig::default(), 12345);
//! simulator.set_pattern(PatternName::Instant);
//!
//! let answer = simulator
//!     .simulate_operation(|| async { Ok::<_, resilience::Error>(42) }, ErrorKind::Network)
//!     .await?;
//! ```

mod error;
mod registry;
pub mod seasonal;
mod simulator;

pub use error::{ErrorKind, SimulationError};
pub use registry::{ConditionPreset, NetworkCondition, PatternName, SimulationPattern};
pub use simulator::{
    AuthKind, AuthSession, EmailKind, SimulationConfig, SimulationConfigUpdate, Simulator,
    SimulatorStats, UploadFile, UploadedFile,
};
