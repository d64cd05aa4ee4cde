//! Model error types

/// Result alias for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// Cold-start model errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    /// Not enough profiles to split and cross-validate
    #[error("need at least {needed} profiles, got {got}")]
    InsufficientData {
        /// Minimum accepted
        needed: usize,
        /// Provided
        got: usize,
    },

    /// `predict` or `analyze_top_slow` before `train`
    #[error("model has not been trained")]
    NotTrained,

    /// Malformed input (mismatched lengths, bad config)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Fitting broke down (singular system, non-finite values)
    #[error("numerical failure: {0}")]
    Numerical(String),

    /// Dependency table regex failed to compile
    #[error("invalid pattern: {0}")]
    Pattern(String),
}

impl ModelError {
    /// Input was rejected before any fitting
    #[inline]
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InsufficientData { .. } | Self::InvalidInput(_) | Self::Pattern(_)
        )
    }
}

impl From<regex::Error> for ModelError {
    fn from(err: regex::Error) -> Self {
        Self::Pattern(err.to_string())
    }
}
