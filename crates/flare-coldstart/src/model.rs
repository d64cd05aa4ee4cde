//! Cold-start model: train, select, predict, diagnose

use crate::analysis::{AnalysisThresholds, SlowFunctionReport};
use crate::error::{ModelError, ModelResult};
use crate::metrics::{mae, r2, rmse};
use crate::oracle::LabelOracle;
use crate::profile::{FunctionProfile, FEATURE_NAMES};
use crate::regressor::{Regressor, RegressorKind};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Fewest profiles `train` accepts
pub const MIN_TRAINING_PROFILES: usize = 10;

/// Training and classification settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Seed for the train/test split and fold assignment
    pub seed: u64,
    /// Share of profiles held out for testing
    pub test_fraction: f64,
    /// Cross-validation folds over the training split
    pub cv_folds: usize,
    /// Below this a prediction is Fast / High confidence
    pub fast_threshold_ms: f64,
    /// Above this a prediction is Slow / Low confidence
    pub slow_threshold_ms: f64,
    /// Candidates compared during training
    pub regressors: Vec<RegressorKind>,
    /// Diagnosis thresholds for `analyze_top_slow`
    pub analysis: AnalysisThresholds,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            test_fraction: 0.2,
            cv_folds: 5,
            fast_threshold_ms: 200.0,
            slow_threshold_ms: 800.0,
            regressors: RegressorKind::defaults(),
            analysis: AnalysisThresholds::default(),
        }
    }
}

impl ModelConfig {
    /// Set the seed
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Check ranges
    ///
    /// # Errors
    /// `InvalidInput` describing the first bad field
    pub fn validate(&self) -> ModelResult<()> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(ModelError::InvalidInput(format!(
                "test_fraction must be in (0, 1), got {}",
                self.test_fraction
            )));
        }
        if self.cv_folds < 2 {
            return Err(ModelError::InvalidInput("cv_folds must be at least 2".into()));
        }
        if self.fast_threshold_ms > self.slow_threshold_ms {
            return Err(ModelError::InvalidInput(
                "fast_threshold_ms must not exceed slow_threshold_ms".into(),
            ));
        }
        if self.regressors.is_empty() {
            return Err(ModelError::InvalidInput("no regressors configured".into()));
        }
        Ok(())
    }
}

/// Held-out and cross-validated scores of one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelScore {
    /// Regressor name
    pub name: String,
    /// Test-split R²
    pub r2: f64,
    /// Test-split MAE (ms)
    pub mae: f64,
    /// Test-split RMSE (ms)
    pub rmse: f64,
    /// Mean RMSE across folds of the training split
    pub cv_rmse: f64,
}

/// Outcome of `train`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Profiles supplied
    pub samples: usize,
    /// Rows fitted
    pub train_size: usize,
    /// Rows held out
    pub test_size: usize,
    /// One entry per candidate, in configured order
    pub scores: Vec<ModelScore>,
    /// Name of the candidate with the lowest test RMSE
    pub best_model: String,
    /// Test R² of the best candidate
    pub best_r2: f64,
    /// Feature order
    pub feature_names: Vec<String>,
}

impl TrainingReport {
    /// Score of the selected model
    #[must_use]
    pub fn best(&self) -> Option<&ModelScore> {
        self.scores.iter().find(|s| s.name == self.best_model)
    }
}

/// How far to trust a prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Fast functions
    High,
    /// Mid-range functions
    Medium,
    /// Slow functions
    Low,
}

/// Cold-start bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Below the fast threshold
    Fast,
    /// Between thresholds, inclusive
    Medium,
    /// Above the slow threshold
    Slow,
}

/// One prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Function name
    pub name: String,
    /// Predicted cold start
    pub predicted_ms: f64,
    /// Confidence bucket
    pub confidence: Confidence,
    /// Speed bucket
    pub category: Category,
}

/// Cold-start predictor
#[derive(Debug)]
pub struct ColdStartModel {
    config: ModelConfig,
    trained: Option<Box<dyn Regressor>>,
    report: Option<TrainingReport>,
}

impl Default for ColdStartModel {
    fn default() -> Self {
        Self::new(ModelConfig::default())
    }
}

impl ColdStartModel {
    /// Untrained model
    #[must_use]
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            trained: None,
            report: None,
        }
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// `train` has succeeded at least once
    #[inline]
    #[must_use]
    pub fn is_trained(&self) -> bool {
        self.trained.is_some()
    }

    /// Report of the last successful `train`
    #[must_use]
    pub fn training_report(&self) -> Option<&TrainingReport> {
        self.report.as_ref()
    }

    /// Fit every candidate, keep the one with the lowest test RMSE
    ///
    /// # Errors
    /// - `InsufficientData` with fewer than ten profiles
    /// - `InvalidInput` for a bad config or an oracle returning the wrong number of labels
    /// - `Numerical` if a candidate cannot be fitted
    pub fn train(
        &mut self,
        profiles: &[FunctionProfile],
        oracle: &dyn LabelOracle,
    ) -> ModelResult<TrainingReport> {
        self.config.validate()?;
        if profiles.len() < MIN_TRAINING_PROFILES {
            return Err(ModelError::InsufficientData {
                needed: MIN_TRAINING_PROFILES,
                got: profiles.len(),
            });
        }
        let labels = oracle.labels(profiles);
        if labels.len() != profiles.len() {
            return Err(ModelError::InvalidInput(format!(
                "oracle returned {} labels for {} profiles",
                labels.len(),
                profiles.len()
            )));
        }
        let features: Vec<Vec<f64>> = profiles.iter().map(FunctionProfile::features).collect();

        let mut order: Vec<usize> = (0..profiles.len()).collect();
        order.shuffle(&mut StdRng::seed_from_u64(self.config.seed));
        let test_size = test_size(profiles.len(), self.config.test_fraction);
        let (test_idx, train_idx) = order.split_at(test_size);

        let pick = |idx: &[usize]| -> (Vec<Vec<f64>>, Vec<f64>) {
            (
                idx.iter().map(|&i| features[i].clone()).collect(),
                idx.iter().map(|&i| labels[i]).collect(),
            )
        };
        let (x_train, y_train) = pick(train_idx);
        let (x_test, y_test) = pick(test_idx);
        let folds = self.config.cv_folds.min(x_train.len());

        let fitted: Vec<(Box<dyn Regressor>, ModelScore)> = self
            .config
            .regressors
            .par_iter()
            .map(|kind| -> ModelResult<_> {
                let mut model = kind.build();
                model.fit(&x_train, &y_train)?;
                let predicted = model.predict(&x_test)?;
                let score = ModelScore {
                    name: model.name().to_string(),
                    r2: r2(&y_test, &predicted),
                    mae: mae(&y_test, &predicted),
                    rmse: rmse(&y_test, &predicted),
                    cv_rmse: cross_validate(kind, &x_train, &y_train, folds)?,
                };
                debug!(model = %score.name, r2 = score.r2, rmse = score.rmse, cv_rmse = score.cv_rmse, "candidate scored");
                Ok((model, score))
            })
            .collect::<ModelResult<_>>()?;

        let scores: Vec<ModelScore> = fitted.iter().map(|(_, s)| s.clone()).collect();
        let best = fitted
            .into_iter()
            .reduce(|best, c| if c.1.rmse < best.1.rmse { c } else { best })
            .ok_or_else(|| ModelError::InvalidInput("no regressors configured".into()))?;

        let report = TrainingReport {
            samples: profiles.len(),
            train_size: x_train.len(),
            test_size: x_test.len(),
            best_model: best.1.name.clone(),
            best_r2: best.1.r2,
            scores,
            feature_names: FEATURE_NAMES.iter().map(|s| (*s).to_string()).collect(),
        };
        info!(
            samples = report.samples,
            best = %report.best_model,
            r2 = report.best_r2,
            "cold-start model trained"
        );
        self.trained = Some(best.0);
        self.report = Some(report.clone());
        Ok(report)
    }

    /// Predict and bucket one profile
    ///
    /// # Errors
    /// `NotTrained` before a successful `train`
    pub fn predict(&self, profile: &FunctionProfile) -> ModelResult<Prediction> {
        let model = self.trained.as_ref().ok_or(ModelError::NotTrained)?;
        let predicted_ms = model.predict_one(&profile.features())?.max(0.0);
        let (category, confidence) = self.classify(predicted_ms);
        Ok(Prediction {
            name: profile.name.clone(),
            predicted_ms,
            confidence,
            category,
        })
    }

    /// Predict many profiles
    ///
    /// # Errors
    /// `NotTrained` before a successful `train`
    pub fn predict_batch(&self, profiles: &[FunctionProfile]) -> ModelResult<Vec<Prediction>> {
        profiles.iter().map(|p| self.predict(p)).collect()
    }

    /// Bucket a predicted duration
    #[must_use]
    pub fn classify(&self, predicted_ms: f64) -> (Category, Confidence) {
        if predicted_ms < self.config.fast_threshold_ms {
            (Category::Fast, Confidence::High)
        } else if predicted_ms <= self.config.slow_threshold_ms {
            (Category::Medium, Confidence::Medium)
        } else {
            (Category::Slow, Confidence::Low)
        }
    }

    /// The `top_n` slowest profiles by prediction, with diagnoses
    ///
    /// # Errors
    /// `NotTrained` before a successful `train`
    pub fn analyze_top_slow(
        &self,
        profiles: &[FunctionProfile],
        top_n: usize,
    ) -> ModelResult<Vec<SlowFunctionReport>> {
        let mut ranked: Vec<(&FunctionProfile, f64)> = profiles
            .iter()
            .map(|p| self.predict(p).map(|pred| (p, pred.predicted_ms)))
            .collect::<ModelResult<_>>()?;
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        Ok(ranked
            .into_iter()
            .take(top_n)
            .map(|(p, ms)| SlowFunctionReport::new(p, ms, &self.config.analysis))
            .collect())
    }
}

fn test_size(n: usize, fraction: f64) -> usize {
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let raw = (n as f64 * fraction).round() as usize;
    raw.clamp(1, n.saturating_sub(2).max(1))
}

/// Mean RMSE over `folds` contiguous folds
fn cross_validate(
    kind: &RegressorKind,
    x: &[Vec<f64>],
    y: &[f64],
    folds: usize,
) -> ModelResult<f64> {
    let n = x.len();
    let mut total = 0.0;
    let mut used = 0u32;
    for fold in 0..folds {
        let (start, end) = (fold * n / folds, (fold + 1) * n / folds);
        if start == end || end - start == n {
            continue;
        }
        let (mut x_fit, mut y_fit) = (Vec::with_capacity(n), Vec::with_capacity(n));
        for i in (0..start).chain(end..n) {
            x_fit.push(x[i].clone());
            y_fit.push(y[i]);
        }
        let mut model = kind.build();
        model.fit(&x_fit, &y_fit)?;
        let predicted = model.predict(&x[start..end])?;
        total += rmse(&y[start..end], &predicted);
        used += 1;
    }
    Ok(if used == 0 { 0.0 } else { total / f64::from(used) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{synthetic_corpus, SyntheticOracle};

    #[test]
    fn test_size_bounds() {
        assert_eq!(test_size(10, 0.2), 2);
        assert_eq!(test_size(50, 0.2), 10);
        assert_eq!(test_size(3, 0.01), 1);
    }

    #[test]
    fn too_few_profiles() {
        let mut model = ColdStartModel::default();
        let err = model
            .train(&synthetic_corpus(9, 1), &SyntheticOracle::new(1))
            .unwrap_err();
        assert_eq!(err, ModelError::InsufficientData { needed: 10, got: 9 });
        assert!(!model.is_trained());
    }

    #[test]
    fn predict_before_train() {
        let model = ColdStartModel::default();
        let p = &synthetic_corpus(1, 1)[0];
        assert_eq!(model.predict(p), Err(ModelError::NotTrained));
        assert_eq!(model.analyze_top_slow(&[p.clone()], 1), Err(ModelError::NotTrained));
    }

    #[test]
    fn classify_boundaries() {
        let model = ColdStartModel::default();
        assert_eq!(model.classify(199.9), (Category::Fast, Confidence::High));
        assert_eq!(model.classify(200.0), (Category::Medium, Confidence::Medium));
        assert_eq!(model.classify(800.0), (Category::Medium, Confidence::Medium));
        assert_eq!(model.classify(800.1), (Category::Slow, Confidence::Low));
    }

    #[test]
    fn minimum_corpus_trains() {
        let mut model = ColdStartModel::default();
        let report = model
            .train(&synthetic_corpus(10, 5), &SyntheticOracle::new(5))
            .unwrap();
        assert_eq!(report.train_size + report.test_size, 10);
        assert_eq!(report.scores.len(), 3);
        assert!(report.best().is_some());
    }
}
