//! Ephemeral function model and lifecycle state machine
//!
//! Two lifecycles are valid:
//! - `Created -> ColdStarting -> Executing -> Completed -> Extinguished`
//! - `Created -> ColdStarting -> Executing -> Failed -> Extinguished`
//!
//! An instance torn down early (aborted or timed out) is extinguished from
//! wherever it stood, so its trace is a prefix of one of the two paths
//! followed by `Extinguished`.

use crate::error::{SchedulerError, SchedulerResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Unique function instance identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FunctionId(pub Ulid);

impl FunctionId {
    /// Generate new function ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for FunctionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of simulated workload
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionType {
    /// Lightweight request handler
    ApiHandler,
    /// Batch data transformation
    DataProcessing,
    /// Model inference
    MlInference,
    /// Query against a dataset
    QueryExecution,
}

impl FunctionType {
    /// Every function type, in declaration order
    pub const ALL: [Self; 4] = [
        Self::ApiHandler,
        Self::DataProcessing,
        Self::MlInference,
        Self::QueryExecution,
    ];

    /// Stable lowercase name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ApiHandler => "api_handler",
            Self::DataProcessing => "data_processing",
            Self::MlInference => "ml_inference",
            Self::QueryExecution => "query_execution",
        }
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionState {
    /// Allocated, not yet provisioned
    Created,
    /// Paying the cold-start cost
    ColdStarting,
    /// Running the workload
    Executing,
    /// Workload succeeded
    Completed,
    /// Workload failed
    Failed,
    /// Torn down; terminal
    Extinguished,
}

impl FunctionState {
    /// Extinguished is the only terminal state
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == Self::Extinguished
    }
}

/// How an instance ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionOutcome {
    /// Ran to completion
    Completed,
    /// Failed (injected fault or torn down early)
    Failed,
    /// Force-extinguished after a bounded wait
    Timeout,
}

/// Validate a lifecycle step
///
/// # Errors
/// Returns `SchedulerError::InvalidTransition` for any step outside the two paths
pub fn validate_transition(from: FunctionState, to: FunctionState) -> SchedulerResult<()> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(SchedulerError::InvalidTransition { from, to })
    }
}

/// States reachable in one step from `from`
#[must_use]
pub fn allowed_transitions(from: FunctionState) -> Vec<FunctionState> {
    use FunctionState::*;
    match from {
        Created => vec![ColdStarting],
        ColdStarting => vec![Executing],
        Executing => vec![Completed, Failed],
        Completed | Failed => vec![Extinguished],
        Extinguished => vec![],
    }
}

/// Caller's reference to an admitted instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionHandle {
    /// Instance id
    pub id: FunctionId,
    /// Workload kind
    pub function_type: FunctionType,
    /// Serialized payload size
    pub payload_bytes: usize,
}

/// Full record of one instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EphemeralFunction {
    /// Instance id
    pub id: FunctionId,
    /// Workload kind
    pub function_type: FunctionType,
    /// Admission time
    pub created_at: DateTime<Utc>,
    /// Current state
    pub state: FunctionState,
    /// Simulated cold-start delay
    pub cold_start_ms: f64,
    /// Simulated execution time
    pub exec_ms: f64,
    /// Cold start was skipped
    pub warm_start: bool,
    /// Request payload
    pub payload: serde_json::Value,
    /// Response on success
    pub response: Option<serde_json::Value>,
    /// Error on failure
    pub error: Option<String>,
    /// Every state entered, in order
    pub trace: Vec<FunctionState>,
    /// Final outcome, set on extinguish
    pub outcome: Option<FunctionOutcome>,
}

impl EphemeralFunction {
    /// New instance in `Created`
    #[must_use]
    pub fn new(function_type: FunctionType, payload: serde_json::Value) -> Self {
        Self {
            id: FunctionId::new(),
            function_type,
            created_at: Utc::now(),
            state: FunctionState::Created,
            cold_start_ms: 0.0,
            exec_ms: 0.0,
            warm_start: false,
            payload,
            response: None,
            error: None,
            trace: vec![FunctionState::Created],
            outcome: None,
        }
    }

    /// Move along a valid path
    ///
    /// # Errors
    /// Returns `InvalidTransition` and leaves the state unchanged
    pub fn transition(&mut self, to: FunctionState) -> SchedulerResult<()> {
        validate_transition(self.state, to)?;
        self.state = to;
        self.trace.push(to);
        Ok(())
    }

    /// Tear down from any non-terminal state
    ///
    /// Instances that never reached `Completed`/`Failed` are recorded with
    /// `early_outcome` and `reason`.
    pub(crate) fn extinguish(&mut self, early_outcome: FunctionOutcome, reason: &str) {
        let outcome = match self.state {
            FunctionState::Completed => FunctionOutcome::Completed,
            FunctionState::Failed => FunctionOutcome::Failed,
            _ => {
                self.error.get_or_insert_with(|| reason.to_string());
                early_outcome
            }
        };
        self.outcome = Some(outcome);
        self.state = FunctionState::Extinguished;
        self.trace.push(FunctionState::Extinguished);
    }

    /// Handle for this instance
    #[must_use]
    pub fn handle(&self, payload_bytes: usize) -> FunctionHandle {
        FunctionHandle {
            id: self.id,
            function_type: self.function_type,
            payload_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_state() -> impl Strategy<Value = FunctionState> {
        prop_oneof![
            Just(FunctionState::Created),
            Just(FunctionState::ColdStarting),
            Just(FunctionState::Executing),
            Just(FunctionState::Completed),
            Just(FunctionState::Failed),
            Just(FunctionState::Extinguished),
        ]
    }

    #[test]
    fn test_happy_path() {
        let mut f = EphemeralFunction::new(FunctionType::ApiHandler, serde_json::Value::Null);
        f.transition(FunctionState::ColdStarting).unwrap();
        f.transition(FunctionState::Executing).unwrap();
        f.transition(FunctionState::Completed).unwrap();
        f.extinguish(FunctionOutcome::Failed, "unused");
        assert_eq!(f.outcome, Some(FunctionOutcome::Completed));
        assert_eq!(
            f.trace,
            vec![
                FunctionState::Created,
                FunctionState::ColdStarting,
                FunctionState::Executing,
                FunctionState::Completed,
                FunctionState::Extinguished,
            ]
        );
        assert!(f.error.is_none());
    }

    #[test]
    fn test_skipping_states_is_rejected() {
        let mut f = EphemeralFunction::new(FunctionType::MlInference, serde_json::Value::Null);
        let err = f.transition(FunctionState::Executing).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidTransition { .. }));
        assert_eq!(f.state, FunctionState::Created);
    }

    #[test]
    fn test_early_extinguish_records_reason() {
        let mut f = EphemeralFunction::new(FunctionType::QueryExecution, serde_json::Value::Null);
        f.transition(FunctionState::ColdStarting).unwrap();
        f.extinguish(FunctionOutcome::Timeout, "drain timeout");
        assert_eq!(f.outcome, Some(FunctionOutcome::Timeout));
        assert_eq!(f.error.as_deref(), Some("drain timeout"));
        assert!(f.state.is_terminal());
    }

    #[test]
    fn test_function_type_names() {
        for t in FunctionType::ALL {
            let json = serde_json::to_value(t).unwrap();
            assert_eq!(json, serde_json::Value::String(t.as_str().to_string()));
        }
    }

    proptest! {
        #[test]
        fn prop_transitions_match_table(from in any_state(), to in any_state()) {
            let allowed = allowed_transitions(from);
            prop_assert_eq!(validate_transition(from, to).is_ok(), allowed.contains(&to));
        }

        #[test]
        fn prop_extinguished_is_a_sink(to in any_state()) {
            prop_assert!(validate_transition(FunctionState::Extinguished, to).is_err());
        }
    }
}
