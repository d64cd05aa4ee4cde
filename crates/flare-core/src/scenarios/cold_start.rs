//! Cold-start model training and slow-function diagnosis

use crate::config::FlareConfig;
use crate::error::{FlareError, FlareResult};
use flare_coldstart::{
    synthetic_corpus, ColdStartModel, ProfileExtractor, SlowFunctionReport, SourceUnit,
    SyntheticOracle, TrainingReport, MIN_TRAINING_PROFILES,
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Most profiles a single training run accepts
pub(crate) const MAX_PROFILES: usize = 10_000;
/// Most slow functions diagnosed
pub(crate) const MAX_TOP_N: usize = 100;

/// Parameters of `cold_start_validation`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColdStartParams {
    /// Source units to profile; a synthetic corpus is used when empty
    pub source_units: Vec<SourceUnit>,
    /// Size of the synthetic corpus
    pub corpus_size: usize,
    /// Overrides the configured seed
    pub seed: Option<u64>,
    /// Slow functions to diagnose
    pub top_n: usize,
    /// Minimum test R² of the selected model
    pub r2_threshold: f64,
    /// Oracle noise amplitude
    pub noise_ms: f64,
}

impl Default for ColdStartParams {
    fn default() -> Self {
        Self {
            source_units: Vec::new(),
            corpus_size: 200,
            seed: None,
            top_n: 3,
            r2_threshold: 0.7,
            noise_ms: 25.0,
        }
    }
}

impl ColdStartParams {
    pub(crate) fn validate(&self) -> FlareResult<()> {
        let n = if self.source_units.is_empty() {
            self.corpus_size
        } else {
            self.source_units.len()
        };
        if n < MIN_TRAINING_PROFILES {
            return Err(FlareError::invalid(format!(
                "need at least {MIN_TRAINING_PROFILES} profiles, got {n}"
            )));
        }
        if n > MAX_PROFILES {
            return Err(FlareError::invalid(format!(
                "at most {MAX_PROFILES} profiles per run, got {n}"
            )));
        }
        if self.top_n > MAX_TOP_N {
            return Err(FlareError::invalid(format!(
                "top_n must be at most {MAX_TOP_N}, got {}",
                self.top_n
            )));
        }
        if !(self.noise_ms >= 0.0 && self.noise_ms.is_finite()) {
            return Err(FlareError::invalid("noise_ms must be non-negative"));
        }
        Ok(())
    }
}

/// Result of `cold_start_validation`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColdStartResult {
    /// Profiles trained on
    pub samples: usize,
    /// Profiles came from source units rather than the synthetic corpus
    pub from_source: bool,
    /// Candidate scores and selection
    pub training: TrainingReport,
    /// Test R² of the selected model
    pub best_r2: f64,
    /// Gate applied to `best_r2`
    pub r2_threshold: f64,
    /// Slowest functions by prediction
    pub top_slow: Vec<SlowFunctionReport>,
    /// `best_r2 > r2_threshold`
    pub passed: bool,
}

/// Train a model; the caller may keep it for predicted cold starts
pub(crate) async fn train(
    config: &FlareConfig,
    params: &ColdStartParams,
) -> FlareResult<(ColdStartModel, ColdStartResult)> {
    params.validate()?;
    let params = params.clone();
    let seed = params.seed.unwrap_or(config.random_seed);
    let model_config = config.model_config().with_seed(seed);

    let (model, result) = tokio::task::spawn_blocking(move || -> FlareResult<_> {
        let from_source = !params.source_units.is_empty();
        let profiles = if from_source {
            ProfileExtractor::with_defaults()?.extract_all(&params.source_units)
        } else {
            synthetic_corpus(params.corpus_size, seed)
        };
        let oracle = SyntheticOracle {
            noise_ms: params.noise_ms,
            ..SyntheticOracle::new(seed)
        };
        let mut model = ColdStartModel::new(model_config);
        let training = model.train(&profiles, &oracle)?;
        let top_slow = model.analyze_top_slow(&profiles, params.top_n)?;
        let result = ColdStartResult {
            samples: profiles.len(),
            from_source,
            best_r2: training.best_r2,
            r2_threshold: params.r2_threshold,
            passed: training.best_r2 > params.r2_threshold,
            training,
            top_slow,
        };
        Ok((model, result))
    })
    .await??;

    info!(
        samples = result.samples,
        best = %result.training.best_model,
        r2 = result.best_r2,
        passed = result.passed,
        "cold start validation finished"
    );
    Ok((model, result))
}
