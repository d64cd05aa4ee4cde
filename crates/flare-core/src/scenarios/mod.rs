//! Validation scenarios
//!
//! - `massive_query`: concurrent aggregations over a large dataset, p99 gate
//! - `cold_start_validation`: train the cold-start model, R² gate
//! - `fireworks_storm`: ramp/sustain load, throttling and success-rate gate
//! - `immutability_versioning`: version, verify, roll back, verify again
//! - `full_validation`: all four in sequence

mod cold_start;
mod fireworks;
mod massive_query;
mod versioning;

pub use cold_start::{ColdStartParams, ColdStartResult};
pub use fireworks::{ColdStartSource, FireworksParams, FireworksResult};
pub use massive_query::{MassiveQueryParams, MassiveQueryResult};
pub use versioning::{VersioningParams, VersioningResult};

pub(crate) use cold_start::train as train_cold_start;
pub(crate) use fireworks::run as run_fireworks;
pub(crate) use massive_query::run as run_massive_query;
pub(crate) use versioning::run as run_versioning;

use crate::error::{FlareError, FlareResult};
use crate::registry::Registry;
use flare_store::VersionRegistry;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use ulid::Ulid;

/// Generated dataset family owned by one scenario run
///
/// `release` drops the family once the run is done. If the run is aborted
/// instead (job timeout, panic), dropping the guard spawns the same cleanup.
#[derive(Debug)]
pub(crate) struct ScratchDataset {
    versions: Arc<VersionRegistry>,
    name: String,
}

impl ScratchDataset {
    pub(crate) fn new(registry: &Registry, prefix: &str) -> Self {
        Self {
            versions: Arc::clone(registry.versions()),
            name: format!("{prefix}_{}", Ulid::new()).to_ascii_lowercase(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) async fn release(mut self) {
        let name = std::mem::take(&mut self.name);
        drop_family(&self.versions, &name).await;
    }
}

impl Drop for ScratchDataset {
    fn drop(&mut self) {
        if self.name.is_empty() {
            return;
        }
        let name = std::mem::take(&mut self.name);
        let versions = Arc::clone(&self.versions);
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move { drop_family(&versions, &name).await });
        }
    }
}

async fn drop_family(versions: &VersionRegistry, name: &str) {
    // never created if the run failed early
    if let Err(e) = versions.drop_family(name).await {
        tracing::debug!(dataset = name, error = %e, "no scratch dataset to drop");
    }
}

/// Scenario names accepted by the job API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    /// Concurrent queries against a large dataset
    MassiveQuery,
    /// Cold-start model training and diagnosis
    ColdStartValidation,
    /// Load test against the function scheduler
    FireworksStorm,
    /// Copy-on-write versioning and rollback
    ImmutabilityVersioning,
    /// The four scenarios above, in order
    FullValidation,
}

impl TestKind {
    /// Every kind, in declaration order
    pub const ALL: [Self; 5] = [
        Self::MassiveQuery,
        Self::ColdStartValidation,
        Self::FireworksStorm,
        Self::ImmutabilityVersioning,
        Self::FullValidation,
    ];

    /// Stable name used in URLs and reports
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MassiveQuery => "massive_query",
            Self::ColdStartValidation => "cold_start_validation",
            Self::FireworksStorm => "fireworks_storm",
            Self::ImmutabilityVersioning => "immutability_versioning",
            Self::FullValidation => "full_validation",
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestKind {
    type Err = FlareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| FlareError::UnknownTest(s.to_string()))
    }
}

/// Parameters of `full_validation`; each section defaults independently
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FullValidationParams {
    /// First scenario
    pub massive_query: MassiveQueryParams,
    /// Second scenario
    pub cold_start_validation: ColdStartParams,
    /// Third scenario
    pub fireworks_storm: FireworksParams,
    /// Fourth scenario
    pub immutability_versioning: VersioningParams,
}

/// Parsed parameters for one scenario
#[derive(Debug, Clone, PartialEq)]
pub enum TestParams {
    /// See [`MassiveQueryParams`]
    MassiveQuery(MassiveQueryParams),
    /// See [`ColdStartParams`]
    ColdStartValidation(ColdStartParams),
    /// See [`FireworksParams`]
    FireworksStorm(FireworksParams),
    /// See [`VersioningParams`]
    ImmutabilityVersioning(VersioningParams),
    /// See [`FullValidationParams`]
    FullValidation(FullValidationParams),
}

impl TestParams {
    /// Parse a JSON body for `kind`; `null` or `{}` means all defaults
    ///
    /// # Errors
    /// `InvalidParams` if the body does not fit the scenario's parameters
    pub fn parse(kind: TestKind, body: serde_json::Value) -> FlareResult<Self> {
        fn de<T: serde::de::DeserializeOwned + Default>(body: serde_json::Value) -> FlareResult<T> {
            if body.is_null() {
                return Ok(T::default());
            }
            serde_json::from_value(body).map_err(|e| FlareError::invalid(e.to_string()))
        }

        let params = match kind {
            TestKind::MassiveQuery => Self::MassiveQuery(de(body)?),
            TestKind::ColdStartValidation => Self::ColdStartValidation(de(body)?),
            TestKind::FireworksStorm => Self::FireworksStorm(de(body)?),
            TestKind::ImmutabilityVersioning => Self::ImmutabilityVersioning(de(body)?),
            TestKind::FullValidation => Self::FullValidation(de(body)?),
        };
        params.validate()?;
        Ok(params)
    }

    /// Defaults for `kind`
    #[must_use]
    pub fn defaults(kind: TestKind) -> Self {
        match kind {
            TestKind::MassiveQuery => Self::MassiveQuery(MassiveQueryParams::default()),
            TestKind::ColdStartValidation => Self::ColdStartValidation(ColdStartParams::default()),
            TestKind::FireworksStorm => Self::FireworksStorm(FireworksParams::default()),
            TestKind::ImmutabilityVersioning => {
                Self::ImmutabilityVersioning(VersioningParams::default())
            }
            TestKind::FullValidation => Self::FullValidation(FullValidationParams::default()),
        }
    }

    /// Scenario these parameters belong to
    #[must_use]
    pub fn kind(&self) -> TestKind {
        match self {
            Self::MassiveQuery(_) => TestKind::MassiveQuery,
            Self::ColdStartValidation(_) => TestKind::ColdStartValidation,
            Self::FireworksStorm(_) => TestKind::FireworksStorm,
            Self::ImmutabilityVersioning(_) => TestKind::ImmutabilityVersioning,
            Self::FullValidation(_) => TestKind::FullValidation,
        }
    }

    /// Reject out-of-range values before anything runs
    ///
    /// # Errors
    /// `InvalidParams` describing the first problem
    pub fn validate(&self) -> FlareResult<()> {
        match self {
            Self::MassiveQuery(p) => p.validate(),
            Self::ColdStartValidation(p) => p.validate(),
            Self::FireworksStorm(p) => p.validate(),
            Self::ImmutabilityVersioning(p) => p.validate(),
            Self::FullValidation(p) => {
                p.massive_query.validate()?;
                p.cold_start_validation.validate()?;
                p.fireworks_storm.validate()?;
                p.immutability_versioning.validate()
            }
        }
    }
}

/// One entry of a full validation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioEntry {
    /// Scenario
    pub test_type: TestKind,
    /// Verdict; false when the scenario errored
    pub passed: bool,
    /// Scenario result, absent when it errored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Box<ScenarioResult>>,
    /// Error that stopped the scenario
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall time
    pub duration_ms: f64,
}

/// Aggregate of a full validation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullValidationResult {
    /// Scenarios that passed
    pub tests_passed: usize,
    /// Scenarios attempted
    pub tests_total: usize,
    /// `tests_passed / tests_total`
    pub success_rate: f64,
    /// Every scenario passed
    pub all_passed: bool,
    /// Per-scenario detail, in run order
    pub tests: Vec<ScenarioEntry>,
}

impl FullValidationResult {
    /// Aggregate entries
    #[must_use]
    pub fn from_entries(tests: Vec<ScenarioEntry>) -> Self {
        let tests_passed = tests.iter().filter(|t| t.passed).count();
        let tests_total = tests.len();
        #[allow(clippy::cast_precision_loss)]
        let success_rate = if tests_total == 0 {
            0.0
        } else {
            tests_passed as f64 / tests_total as f64
        };
        Self {
            tests_passed,
            tests_total,
            success_rate,
            all_passed: tests_total > 0 && tests_passed == tests_total,
            tests,
        }
    }

    /// Entry for one scenario
    #[must_use]
    pub fn entry(&self, kind: TestKind) -> Option<&ScenarioEntry> {
        self.tests.iter().find(|t| t.test_type == kind)
    }
}

/// Result of any scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "test_type", rename_all = "snake_case")]
pub enum ScenarioResult {
    /// See [`MassiveQueryResult`]
    MassiveQuery(MassiveQueryResult),
    /// See [`ColdStartResult`]
    ColdStartValidation(ColdStartResult),
    /// See [`FireworksResult`]
    FireworksStorm(FireworksResult),
    /// See [`VersioningResult`]
    ImmutabilityVersioning(VersioningResult),
    /// See [`FullValidationResult`]
    FullValidation(FullValidationResult),
}

impl ScenarioResult {
    /// Scenario verdict
    #[must_use]
    pub fn passed(&self) -> bool {
        match self {
            Self::MassiveQuery(r) => r.passed,
            Self::ColdStartValidation(r) => r.passed,
            Self::FireworksStorm(r) => r.passed,
            Self::ImmutabilityVersioning(r) => r.passed,
            Self::FullValidation(r) => r.all_passed,
        }
    }

    /// Scenario that produced this result
    #[must_use]
    pub fn kind(&self) -> TestKind {
        match self {
            Self::MassiveQuery(_) => TestKind::MassiveQuery,
            Self::ColdStartValidation(_) => TestKind::ColdStartValidation,
            Self::FireworksStorm(_) => TestKind::FireworksStorm,
            Self::ImmutabilityVersioning(_) => TestKind::ImmutabilityVersioning,
            Self::FullValidation(_) => TestKind::FullValidation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_round_trip() {
        for kind in TestKind::ALL {
            assert_eq!(kind.as_str().parse::<TestKind>().unwrap(), kind);
            assert_eq!(serde_json::to_value(kind).unwrap(), kind.as_str());
        }
        assert!(matches!("nope".parse::<TestKind>(), Err(FlareError::UnknownTest(_))));
    }

    #[test]
    fn empty_body_means_defaults() {
        for kind in TestKind::ALL {
            assert_eq!(
                TestParams::parse(kind, serde_json::Value::Null).unwrap(),
                TestParams::defaults(kind)
            );
            assert_eq!(
                TestParams::parse(kind, serde_json::json!({})).unwrap(),
                TestParams::defaults(kind)
            );
        }
    }

    #[test]
    fn malformed_body_is_invalid() {
        let err = TestParams::parse(TestKind::FireworksStorm, serde_json::json!({"target_rps": "many"}))
            .unwrap_err();
        assert!(matches!(err, FlareError::InvalidParams(_)));
        let err = TestParams::parse(TestKind::FireworksStorm, serde_json::json!({"target_rps": 0}))
            .unwrap_err();
        assert!(matches!(err, FlareError::InvalidParams(_)));
    }

    #[test]
    fn oversized_params_are_invalid() {
        use serde_json::json;
        let oversized = [
            (TestKind::FireworksStorm, json!({ "payload_bytes": 1_000_000_000_000_u64 })),
            (TestKind::FireworksStorm, json!({ "target_rps": fireworks::MAX_TARGET_RPS + 1 })),
            (TestKind::FireworksStorm, json!({ "ramp_seconds": 3000, "sustain_seconds": 3000 })),
            (TestKind::MassiveQuery, json!({ "concurrent_queries": u64::MAX })),
            (TestKind::MassiveQuery, json!({ "size_gb": 1.0e9 })),
            (TestKind::MassiveQuery, json!({ "min_partitions": u32::MAX })),
            (TestKind::ColdStartValidation, json!({ "corpus_size": cold_start::MAX_PROFILES + 1 })),
            (TestKind::ColdStartValidation, json!({ "top_n": 1_000_000 })),
            (TestKind::ImmutabilityVersioning, json!({ "size_mb": 1_u64 << 44 })),
            (TestKind::ImmutabilityVersioning, json!({ "min_partitions": u32::MAX })),
        ];
        for (kind, body) in oversized {
            let err = TestParams::parse(kind, body.clone()).unwrap_err();
            assert!(matches!(err, FlareError::InvalidParams(_)), "{kind} {body}");
        }
    }

    #[test]
    fn params_at_the_caps_are_accepted() {
        use serde_json::json;
        let at_cap = [
            (TestKind::FireworksStorm, json!({ "payload_bytes": fireworks::MAX_PAYLOAD_BYTES })),
            (TestKind::MassiveQuery, json!({ "concurrent_queries": massive_query::MAX_CONCURRENT_QUERIES })),
            (TestKind::ImmutabilityVersioning, json!({ "size_mb": versioning::MAX_SIZE_MB })),
        ];
        for (kind, body) in at_cap {
            assert!(TestParams::parse(kind, body.clone()).is_ok(), "{kind} {body}");
        }
    }

    #[test]
    fn full_validation_aggregates() {
        let entry = |passed| ScenarioEntry {
            test_type: TestKind::MassiveQuery,
            passed,
            result: None,
            error: None,
            duration_ms: 1.0,
        };
        let full = FullValidationResult::from_entries(vec![entry(true), entry(false), entry(true), entry(true)]);
        assert_eq!(full.tests_passed, 3);
        assert_eq!(full.tests_total, 4);
        assert!((full.success_rate - 0.75).abs() < 1e-12);
        assert!(!full.all_passed);
    }
}
