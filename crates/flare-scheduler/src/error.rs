//! Scheduler error types

use crate::function::{FunctionId, FunctionState};

/// Result alias for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler and load-generator errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchedulerError {
    /// Active set is at the throttle limit; nothing was registered
    #[error("throttled: {active} active functions at limit {limit}")]
    Throttled {
        /// Configured limit
        limit: usize,
        /// Active set size at rejection
        active: usize,
    },

    /// Injected execution failure
    #[error("function {id} failed: {reason}")]
    ComputeFailure {
        /// Failed function
        id: FunctionId,
        /// Injected reason
        reason: String,
    },

    /// Lifecycle step out of order
    #[error("invalid transition {from:?} -> {to:?}")]
    InvalidTransition {
        /// Current state
        from: FunctionState,
        /// Requested state
        to: FunctionState,
    },

    /// Function is not in the active set
    #[error("function not active: {0}")]
    NotFound(FunctionId),

    /// A bounded wait expired
    #[error("timed out after {waited_ms} ms: {what}")]
    Timeout {
        /// What was being waited for
        what: String,
        /// Wait bound
        waited_ms: u64,
    },

    /// Rejected load profile or scheduler configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SchedulerError {
    /// Check if the caller may retry later
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled { .. })
    }

    /// Check if this is a throttling rejection
    #[inline]
    #[must_use]
    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled { .. })
    }
}
