//! Flare cold-start model
//!
//! Predicts invocation cold-start cost from static function profiles:
//! - [`ProfileExtractor`]: source text to [`FunctionProfile`]
//! - [`LabelOracle`]: where training labels come from ([`SyntheticOracle`])
//! - [`ColdStartModel`]: trains Ridge, kNN and boosted-stump candidates, keeps the best
//! - [`SlowFunctionReport`]: rule-based diagnosis of the slowest functions
//!
//! Scores only measure agreement with the oracle in use.

pub mod analysis;
pub mod error;
pub mod extractor;
pub mod metrics;
pub mod model;
pub mod oracle;
pub mod profile;
pub mod regressor;

pub use analysis::{diagnose, estimated_improvement_ms, AnalysisThresholds, Issue, SlowFunctionReport, MAX_IMPROVEMENT};
pub use error::{ModelError, ModelResult};
pub use extractor::{ExtractorConfig, ProfileExtractor, SourceUnit};
pub use model::{
    Category, ColdStartModel, Confidence, ModelConfig, ModelScore, Prediction, TrainingReport,
    MIN_TRAINING_PROFILES,
};
pub use oracle::{synthetic_corpus, LabelOracle, OracleWeights, SyntheticOracle};
pub use profile::{FunctionProfile, ModuleType, FEATURE_NAMES};
pub use regressor::{BoostedStumps, KnnRegressor, Regressor, RegressorKind, RidgeRegressor, Standardizer};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for common imports
pub mod prelude {
    pub use crate::{
        ColdStartModel, FunctionProfile, LabelOracle, ModelConfig, ModelError, ModelResult,
        ModuleType, Prediction, ProfileExtractor, SourceUnit, SyntheticOracle, TrainingReport,
    };
}
