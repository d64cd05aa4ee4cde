//! Flare validation orchestrator
//!
//! Ties the dataset store, the function scheduler and the cold-start model
//! together behind one entry point:
//! - [`ValidationOrchestrator`]: runs scenarios inline or as jobs
//! - [`JobRegistry`]: asynchronous jobs with cancellation and a deadline
//! - [`FlareConfig`]: defaults, TOML file and `FLARE_*` overrides
//! - [`PredictiveCostModel`]: scheduler cold starts priced by the trained model
//!
//! # Example
//!
//! ```no_run
//! use flare_core::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run() -> FlareResult<()> {
//! let orchestrator = Arc::new(ValidationOrchestrator::new(FlareConfig::default())?);
//! let id = orchestrator.submit_test(TestKind::ImmutabilityVersioning, serde_json::Value::Null)?;
//! let report = orchestrator.wait_job(id).await?;
//! println!("{}", report.generate_text());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod cost;
pub mod error;
pub mod jobs;
pub mod orchestrator;
pub mod registry;
pub mod report;
pub mod scenarios;

pub use config::FlareConfig;
pub use cost::{representative_profile, PredictiveCostModel};
pub use error::{Classify, ErrorKind, FlareError, FlareResult};
pub use jobs::{JobId, JobRegistry, JobStatus, ValidationReport};
pub use orchestrator::{HealthReport, ValidationOrchestrator};
pub use registry::Registry;
pub use scenarios::{
    ColdStartParams, ColdStartResult, ColdStartSource, FireworksParams, FireworksResult,
    FullValidationParams, FullValidationResult, MassiveQueryParams, MassiveQueryResult,
    ScenarioEntry, ScenarioResult, TestKind, TestParams, VersioningParams, VersioningResult,
};

pub use flare_scheduler::CancelToken;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for common imports
pub mod prelude {
    pub use crate::{
        CancelToken, FlareConfig, FlareError, FlareResult, JobId, JobStatus, ScenarioResult,
        TestKind, TestParams, ValidationOrchestrator, ValidationReport,
    };
}
