//! Error Types
//!
//! Probe failures (`ProbeError`) stay inside a check module and become a
//! rendered line. Dispatch failures (`DiagError`) decide the process exit code.
//! `RegistryError` is raised once, at startup, when the mode table is inconsistent.

use std::time::Duration;
use thiserror::Error;

use crate::mode::RunMode;

/// Failure of a single probe against an external system
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The adapter needed for this probe is not available on this host
    #[error("Adapter unavailable: {0}")]
    AdapterUnavailable(String),

    /// The probe did not answer in time
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The remote side could not be reached
    #[error("Unreachable: {0}")]
    Unreachable(String),

    /// The probe ran but reported a failure
    #[error("Probe failed: {0}")]
    Failed(String),

    /// Input rejected before any probing happened
    #[error("Validation error: {0}")]
    Validation(String),

    /// The run was cancelled
    #[error("Cancelled")]
    Cancelled,

    /// I/O error while probing or writing output
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProbeError {
    pub fn unavailable(what: impl Into<String>) -> Self {
        Self::AdapterUnavailable(what.into())
    }

    pub fn unreachable(what: impl Into<String>) -> Self {
        Self::Unreachable(what.into())
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    /// Degraded rather than broken: rendered as WARN
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::AdapterUnavailable(_) | Self::Timeout(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest does not expose the configured duration
            Self::Timeout(Duration::ZERO)
        } else if err.is_connect() {
            Self::Unreachable(err.to_string())
        } else {
            Self::Failed(err.to_string())
        }
    }
}

/// Failure that ends a dispatcher invocation with a non-zero exit code
#[derive(Debug, Error)]
pub enum DiagError {
    #[error("Unknown run mode: {0}")]
    UnknownRunMode(String),

    #[error("Invalid parameters: {0}")]
    Validation(String),

    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Operation declined by user")]
    Declined,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DiagError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    pub fn missing_input(what: impl Into<String>) -> Self {
        Self::MissingInput(what.into())
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        1
    }
}

/// Inconsistent run-mode table detected at startup
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Run mode {0} has no registered handler")]
    MissingHandler(RunMode),

    #[error("Run mode {0} has more than one registered handler")]
    DuplicateHandler(RunMode),

    #[error("Run mode {0} has no descriptor")]
    MissingDescriptor(RunMode),

    #[error("Run mode {0} has more than one descriptor")]
    DuplicateDescriptor(RunMode),
}
