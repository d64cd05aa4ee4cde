//! Error types for the dataset store
//!
//! Covers:
//! - Input validation (names, sizes, modification pipelines)
//! - Missing datasets, versions and stored objects
//! - Partition write failures and checksum violations
//! - Backend IO and serialization failures

use std::path::PathBuf;

/// Result alias used throughout the crate
pub type StoreResult<T> = Result<T, StoreError>;

/// Main store error type
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Input rejected before any work started
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Dataset family already registered
    #[error("dataset already exists: {0}")]
    AlreadyExists(String),

    /// Unknown dataset family
    #[error("dataset not found: {0}")]
    DatasetNotFound(String),

    /// Version absent from the family's history
    #[error("version {version} not found for dataset {name}")]
    VersionNotFound {
        /// Base dataset name
        name: String,
        /// Requested version
        version: u32,
    },

    /// Backend has no object under this key
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// Write-once violation
    #[error("object already written: {0}")]
    ObjectExists(String),

    /// Partition write failed permanently
    #[error("partition {partition} write failed after {attempts} attempts: {reason}")]
    WriteFailed {
        /// Partition identifier
        partition: String,
        /// Attempts made
        attempts: u32,
        /// Last failure
        reason: String,
    },

    /// Stored bytes no longer match the recorded checksum
    #[error("checksum mismatch for {locator}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Storage locator
        locator: String,
        /// Checksum recorded at write time
        expected: String,
        /// Checksum of the bytes read back
        actual: String,
    },

    /// Backend-specific failure
    #[error("backend error: {0}")]
    Backend(String),

    /// Filesystem failure
    #[error("io error at {path}: {source}")]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// JSON encoding or decoding failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Background task panicked or was cancelled
    #[error("task failed: {0}")]
    Task(String),
}

impl StoreError {
    /// Create invalid input error
    #[inline]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Input was rejected before work started
    #[inline]
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::AlreadyExists(_))
    }

    /// Dataset, version or object is unknown
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::DatasetNotFound(_) | Self::VersionNotFound { .. } | Self::ObjectNotFound(_)
        )
    }

    /// Check if retrying the same call could succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend(_) | Self::Io { .. } | Self::WriteFailed { .. })
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}
