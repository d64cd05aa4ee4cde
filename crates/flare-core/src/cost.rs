//! Cold starts priced by the trained model
//!
//! Each function type is mapped to a representative profile and its
//! prediction is computed once, up front: the scheduler consults its cost
//! model under the state lock, so lookups must be cheap.

use crate::error::FlareResult;
use flare_coldstart::{ColdStartModel, FunctionProfile, ModuleType};
use flare_scheduler::{ColdStart, CostModel, DefaultCostModel, FunctionType};
use rand::{Rng, RngCore};
use std::collections::HashMap;
use std::time::Duration;

/// [`CostModel`] whose cold starts come from a [`ColdStartModel`]
#[derive(Debug, Clone)]
pub struct PredictiveCostModel {
    predicted_ms: HashMap<FunctionType, f64>,
    base: DefaultCostModel,
}

impl PredictiveCostModel {
    /// Predict every function type's representative profile
    ///
    /// # Errors
    /// `Model(NotTrained)` if the model has not been trained
    pub fn new(model: &ColdStartModel) -> FlareResult<Self> {
        let profiles: HashMap<FunctionType, FunctionProfile> = FunctionType::ALL
            .into_iter()
            .map(|t| (t, representative_profile(t)))
            .collect();
        Self::with_profiles(model, &profiles)
    }

    /// Predict explicit profiles; types without one fall back to the synthetic model
    ///
    /// # Errors
    /// `Model(NotTrained)` if the model has not been trained
    pub fn with_profiles(
        model: &ColdStartModel,
        profiles: &HashMap<FunctionType, FunctionProfile>,
    ) -> FlareResult<Self> {
        let mut predicted_ms = HashMap::with_capacity(profiles.len());
        for (t, profile) in profiles {
            predicted_ms.insert(*t, model.predict(profile)?.predicted_ms);
        }
        Ok(Self {
            predicted_ms,
            base: DefaultCostModel::default(),
        })
    }

    /// Replace the warm-start probability, jitter and execution model
    #[must_use]
    pub fn with_base(mut self, base: DefaultCostModel) -> Self {
        self.base = base;
        self
    }

    /// Prediction used for a type
    #[must_use]
    pub fn predicted_ms(&self, function_type: FunctionType) -> Option<f64> {
        self.predicted_ms.get(&function_type).copied()
    }
}

impl CostModel for PredictiveCostModel {
    fn cold_start(&self, function_type: FunctionType, payload_bytes: usize, rng: &mut dyn RngCore) -> ColdStart {
        let Some(&predicted) = self.predicted_ms.get(&function_type) else {
            return self.base.cold_start(function_type, payload_bytes, rng);
        };
        if self.base.warm_start_probability > 0.0
            && rng.gen_bool(self.base.warm_start_probability.min(1.0))
        {
            return ColdStart::warm();
        }
        #[allow(clippy::cast_precision_loss)]
        let kib = payload_bytes as f64 / 1024.0;
        let factor = if self.base.jitter > 0.0 {
            1.0 + rng.gen_range(-self.base.jitter..=self.base.jitter)
        } else {
            1.0
        };
        ColdStart::cold_ms((predicted + kib * self.base.per_kib_ms) * factor)
    }

    fn execution(&self, function_type: FunctionType, rng: &mut dyn RngCore) -> Duration {
        self.base.execution(function_type, rng)
    }
}

/// Typical deployment for each function type
#[must_use]
pub fn representative_profile(function_type: FunctionType) -> FunctionProfile {
    const MIB: u64 = 1024 * 1024;
    let base = FunctionProfile {
        name: function_type.as_str().to_string(),
        size_bytes: 2 * MIB,
        import_count: 8,
        dependency_weight: 4.0,
        complexity_score: 20.0,
        has_ml_deps: false,
        has_db_deps: false,
        has_heavy_deps: false,
        module_type: ModuleType::Handler,
    };
    match function_type {
        FunctionType::ApiHandler => base,
        FunctionType::DataProcessing => FunctionProfile {
            size_bytes: 15 * MIB,
            import_count: 25,
            dependency_weight: 14.0,
            complexity_score: 60.0,
            has_heavy_deps: true,
            module_type: ModuleType::Worker,
            ..base
        },
        FunctionType::MlInference => FunctionProfile {
            size_bytes: 40 * MIB,
            import_count: 30,
            dependency_weight: 20.0,
            complexity_score: 45.0,
            has_ml_deps: true,
            has_heavy_deps: true,
            module_type: ModuleType::Service,
            ..base
        },
        FunctionType::QueryExecution => FunctionProfile {
            size_bytes: 6 * MIB,
            import_count: 12,
            dependency_weight: 7.0,
            complexity_score: 35.0,
            has_db_deps: true,
            module_type: ModuleType::Service,
            ..base
        },
    }
}
