//! Training labels and synthetic corpora
//!
//! Labels come from a [`LabelOracle`]. [`SyntheticOracle`] is a weighted sum
//! of profile features plus bounded, seeded noise; a model scored against
//! it has only learned that formula. Swap in an oracle backed by measured
//! cold starts to learn something real.

use crate::profile::{FunctionProfile, ModuleType};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Source of cold-start labels for training
pub trait LabelOracle: Send + Sync + Debug {
    /// One label (milliseconds) per profile, in order
    fn labels(&self, profiles: &[FunctionProfile]) -> Vec<f64>;
}

/// Weights of the synthetic label formula
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleWeights {
    /// Constant term
    pub base_ms: f64,
    /// Per MiB of package
    pub per_mb_ms: f64,
    /// Per import
    pub per_import_ms: f64,
    /// Per unit of dependency weight
    pub per_dependency_weight_ms: f64,
    /// Per unit of complexity
    pub per_complexity_ms: f64,
    /// ML dependency present
    pub ml_ms: f64,
    /// DB dependency present
    pub db_ms: f64,
    /// Heavy dependency present
    pub heavy_ms: f64,
    /// Extra cost of service modules
    pub service_ms: f64,
    /// Extra cost of worker modules
    pub worker_ms: f64,
}

impl Default for OracleWeights {
    fn default() -> Self {
        Self {
            base_ms: 80.0,
            per_mb_ms: 35.0,
            per_import_ms: 4.0,
            per_dependency_weight_ms: 12.0,
            per_complexity_ms: 1.5,
            ml_ms: 350.0,
            db_ms: 90.0,
            heavy_ms: 180.0,
            service_ms: 40.0,
            worker_ms: 60.0,
        }
    }
}

/// Deterministic weighted sum plus bounded uniform noise
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticOracle {
    /// Formula weights
    pub weights: OracleWeights,
    /// Noise is drawn uniformly from `[-noise_ms, noise_ms]`
    pub noise_ms: f64,
    /// Noise seed
    pub seed: u64,
}

impl SyntheticOracle {
    /// Default weights with the given seed and 25 ms of noise
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            weights: OracleWeights::default(),
            noise_ms: 25.0,
            seed,
        }
    }

    /// Noise-free label
    #[must_use]
    pub fn expected_ms(&self, p: &FunctionProfile) -> f64 {
        let w = &self.weights;
        let module = match p.module_type {
            ModuleType::Service => w.service_ms,
            ModuleType::Worker => w.worker_ms,
            ModuleType::Handler | ModuleType::Library | ModuleType::Script => 0.0,
        };
        w.base_ms
            + w.per_mb_ms * p.size_mb()
            + w.per_import_ms * f64::from(p.import_count)
            + w.per_dependency_weight_ms * p.dependency_weight
            + w.per_complexity_ms * p.complexity_score
            + if p.has_ml_deps { w.ml_ms } else { 0.0 }
            + if p.has_db_deps { w.db_ms } else { 0.0 }
            + if p.has_heavy_deps { w.heavy_ms } else { 0.0 }
            + module
    }
}

impl LabelOracle for SyntheticOracle {
    fn labels(&self, profiles: &[FunctionProfile]) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        profiles
            .iter()
            .map(|p| {
                let noise = if self.noise_ms > 0.0 {
                    rng.gen_range(-self.noise_ms..=self.noise_ms)
                } else {
                    0.0
                };
                (self.expected_ms(p) + noise).max(0.0)
            })
            .collect()
    }
}

/// Reproducible synthetic profiles
#[must_use]
pub fn synthetic_corpus(n: usize, seed: u64) -> Vec<FunctionProfile> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let module_type = ModuleType::ALL[rng.gen_range(0..ModuleType::ALL.len())];
            let import_count: u32 = rng.gen_range(1..=60);
            let has_ml_deps = rng.gen_bool(0.2);
            let has_db_deps = rng.gen_bool(0.35);
            let has_heavy_deps = rng.gen_bool(0.3);
            let flagged = 3.0 * f64::from(u8::from(has_ml_deps))
                + 1.5 * f64::from(u8::from(has_db_deps))
                + 2.0 * f64::from(u8::from(has_heavy_deps));
            let dependency_weight = flagged + 0.5 * f64::from(rng.gen_range(0..=import_count));
            // log-uniform between 16 KiB and 32 MiB
            let size_exp: f64 = rng.gen_range(14.0..25.0);
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let size_bytes = size_exp.exp2() as u64;
            FunctionProfile {
                name: format!("fn_{i:04}_{}", module_name(module_type)),
                size_bytes,
                import_count,
                dependency_weight,
                complexity_score: rng.gen_range(1.0..150.0),
                has_ml_deps,
                has_db_deps,
                has_heavy_deps,
                module_type,
            }
        })
        .collect()
}

fn module_name(m: ModuleType) -> &'static str {
    match m {
        ModuleType::Handler => "handler",
        ModuleType::Service => "service",
        ModuleType::Worker => "worker",
        ModuleType::Library => "lib",
        ModuleType::Script => "script",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corpus_is_reproducible() {
        assert_eq!(synthetic_corpus(20, 42), synthetic_corpus(20, 42));
        assert_ne!(synthetic_corpus(20, 42), synthetic_corpus(20, 43));
    }

    #[test]
    fn noise_is_bounded() {
        let profiles = synthetic_corpus(200, 1);
        let oracle = SyntheticOracle::new(9);
        for (p, label) in profiles.iter().zip(oracle.labels(&profiles)) {
            let expected = oracle.expected_ms(p);
            assert!((label - expected).abs() <= oracle.noise_ms + 1e-9);
        }
    }

    #[test]
    fn labels_are_deterministic() {
        let profiles = synthetic_corpus(10, 3);
        let oracle = SyntheticOracle::new(42);
        assert_eq!(oracle.labels(&profiles), oracle.labels(&profiles));
    }
}
