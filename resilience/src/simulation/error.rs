//! Classified simulation failures.
//!
//! Every injected failure carries exactly one [`ErrorKind`], and its
//! retryability is a function of that kind alone, so callers can branch on
//! [`SimulationError::is_retryable`] without looking at the message.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Category of a simulated operation, and of the failures it can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Network,
    Validation,
    Processing,
    Auth,
    Upload,
    Download,
}

impl ErrorKind {
    pub const ALL: [Self; 6] = [
        Self::Network,
        Self::Validation,
        Self::Processing,
        Self::Auth,
        Self::Upload,
        Self::Download,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Validation => "validation",
            Self::Processing => "processing",
            Self::Auth => "auth",
            Self::Upload => "upload",
            Self::Download => "download",
        }
    }

    /// Validation and auth failures will fail the same way again; everything
    /// else is transient.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        !matches!(self, Self::Validation | Self::Auth)
    }

    /// Message pool injected failures of this kind draw from.
    #[must_use]
    pub const fn messages(self) -> &'static [&'static str] {
        match self {
            Self::Network => &[
                "Network connection lost. Please check your internet connection.",
                "The request timed out. Please try again.",
                "The server is temporarily unavailable.",
                "Connection reset by peer.",
            ],
            Self::Validation => &[
                "The submitted data is invalid.",
                "Required fields are missing.",
                "The value is outside the allowed range.",
            ],
            Self::Processing => &[
                "The report could not be generated.",
                "An unexpected error occurred while processing the data.",
                "The processing queue is full. Please try again later.",
            ],
            Self::Auth => &[
                "Your session has expired. Please sign in again.",
                "You do not have permission to perform this action.",
                "Authentication failed.",
            ],
            Self::Upload => &[
                "The upload was interrupted.",
                "The file could not be uploaded. Please try again.",
                "The upload server rejected the transfer.",
            ],
            Self::Download => &[
                "The download failed. Please try again.",
                "The file is temporarily unavailable.",
                "The download link has expired.",
            ],
        }
    }

    /// Pick one message from this kind's pool.
    pub fn pick_message<R: Rng + ?Sized>(self, rng: &mut R) -> &'static str {
        let pool = self.messages();
        pool[rng.random_range(0..pool.len())]
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified, simulated failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationError {
    kind: ErrorKind,
    message: String,
    code: String,
    retryable: bool,
}

impl SimulationError {
    /// Build an error of `kind` with a message drawn from the kind's pool
    /// and a synthetic `SIM_<KIND>_<n>` code.
    pub fn random<R: Rng + ?Sized>(kind: ErrorKind, rng: &mut R) -> Self {
        let message = kind.pick_message(rng);
        Self::with_message(kind, message, rng)
    }

    /// Build an error of `kind` with an explicit message.
    pub fn with_message<R: Rng + ?Sized>(
        kind: ErrorKind,
        message: impl Into<String>,
        rng: &mut R,
    ) -> Self {
        let code = format!(
            "SIM_{}_{}",
            kind.as_str().to_ascii_uppercase(),
            rng.random_range(0..1000u16)
        );
        Self {
            kind,
            message: message.into(),
            code,
            retryable: kind.is_retryable(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.retryable
    }
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl std::error::Error for SimulationError {}
