//! Flare function scheduler
//!
//! Simulated ephemeral compute:
//! - [`FunctionScheduler`]: lifecycle state machine, active set, throttling
//! - [`LoadGenerator`]: ramp/sustain workload with bounded drain
//! - [`CostModel`] / [`FaultInjector`]: injectable timing and failure sources
//! - [`CancelToken`]: cooperative cancellation for long runs

pub mod cancel;
pub mod cost;
pub mod error;
pub mod fault;
pub mod function;
pub mod load;
pub mod metrics;
pub mod scheduler;

pub use cancel::CancelToken;
pub use cost::{ColdStart, CostModel, DefaultCostModel, FixedCostModel};
pub use error::{SchedulerError, SchedulerResult};
pub use fault::{FailEveryNth, FailFunctionTypes, FaultInjector, NoFaults};
pub use function::{
    allowed_transitions, validate_transition, EphemeralFunction, FunctionHandle, FunctionId,
    FunctionOutcome, FunctionState, FunctionType,
};
pub use load::{expected_requests, LoadGenerator, LoadPhase, LoadProfile, LoadTestReport, PhaseRecord};
pub use metrics::{percentile, LatencySummary};
pub use scheduler::{FunctionScheduler, SchedulerConfig, SchedulerObserver, SchedulerStats};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for common imports
pub mod prelude {
    pub use crate::{
        CancelToken, CostModel, FunctionOutcome, FunctionScheduler, FunctionState, FunctionType,
        LoadGenerator, LoadProfile, LoadTestReport, SchedulerConfig, SchedulerError,
        SchedulerResult,
    };
}
