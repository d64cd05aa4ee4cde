//! Error types for the orchestrator
//!
//! Every crate error maps onto one [`ErrorKind`]:
//! - `Validation` and `NotFound` are returned before work starts
//! - `Throttling` and `ComputeFailure` are per-unit outcomes inside a run
//! - `Timeout` aborts one drain or job
//! - `Internal` covers everything else (IO, serialization, panics)

use crate::jobs::JobId;
use flare_coldstart::ModelError;
use flare_scheduler::SchedulerError;
use flare_store::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Result alias for orchestrator operations
pub type FlareResult<T> = Result<T, FlareError>;

/// Shared error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input
    Validation,
    /// Unknown dataset, version, job or test
    NotFound,
    /// Active set at its limit
    Throttling,
    /// Deadline exceeded
    Timeout,
    /// Injected or simulated compute failure
    ComputeFailure,
    /// Anything else
    Internal,
}

impl ErrorKind {
    /// Stable lowercase name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Throttling => "throttling",
            Self::Timeout => "timeout",
            Self::ComputeFailure => "compute_failure",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps an error onto [`ErrorKind`]
pub trait Classify {
    /// Taxonomy bucket
    fn kind(&self) -> ErrorKind;
}

impl Classify for StoreError {
    fn kind(&self) -> ErrorKind {
        if self.is_validation() {
            ErrorKind::Validation
        } else if self.is_not_found() {
            ErrorKind::NotFound
        } else {
            ErrorKind::Internal
        }
    }
}

impl Classify for SchedulerError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Throttled { .. } => ErrorKind::Throttling,
            Self::ComputeFailure { .. } => ErrorKind::ComputeFailure,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidConfig(_) => ErrorKind::Validation,
            Self::InvalidTransition { .. } => ErrorKind::Internal,
        }
    }
}

impl Classify for ModelError {
    fn kind(&self) -> ErrorKind {
        if self.is_validation() || matches!(self, Self::NotTrained) {
            ErrorKind::Validation
        } else {
            ErrorKind::Internal
        }
    }
}

/// Main orchestrator error type
#[derive(Debug, thiserror::Error)]
pub enum FlareError {
    /// Dataset store failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Scheduler failure
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Cold-start model failure
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// Scenario parameters rejected
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// Configuration rejected
    #[error("configuration error: {0}")]
    Config(String),

    /// Unknown test name
    #[error("unknown test: {0}")]
    UnknownTest(String),

    /// Unknown job id
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// Deadline exceeded
    #[error("{what} timed out after {secs}s")]
    Timeout {
        /// What was being waited on
        what: String,
        /// Deadline
        secs: u64,
    },

    /// Cancelled before completion
    #[error("operation cancelled")]
    Cancelled,

    /// Filesystem failure
    #[error("io error at {path}: {source}")]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Background task panicked or was aborted
    #[error("internal error: {0}")]
    Internal(String),
}

impl FlareError {
    /// Create invalid parameters error
    #[inline]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParams(message.into())
    }

    /// Taxonomy bucket
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Store(e) => e.kind(),
            Self::Scheduler(e) => e.kind(),
            Self::Model(e) => e.kind(),
            Self::InvalidParams(_) | Self::Config(_) => ErrorKind::Validation,
            Self::UnknownTest(_) | Self::JobNotFound(_) => ErrorKind::NotFound,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled | Self::Io { .. } | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Check if retrying the same call could succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_retryable(),
            Self::Scheduler(e) => e.is_retryable(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}

impl From<tokio::task::JoinError> for FlareError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(err.to_string())
    }
}
