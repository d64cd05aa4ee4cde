//! Simulated timing costs
//!
//! The scheduler never invents delays itself; it asks a [`CostModel`].
//! [`DefaultCostModel`] is a synthetic distribution. Anything that can put a
//! number on a cold start (a trained predictor, replayed telemetry) can be
//! plugged in instead.

use crate::function::FunctionType;
use rand::{Rng, RngCore};
use std::fmt::Debug;
use std::time::Duration;

/// Cold-start draw
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColdStart {
    /// Delay before the instance becomes invokable
    pub delay: Duration,
    /// Instance was reused; no provisioning cost
    pub warm: bool,
}

impl ColdStart {
    /// Zero-cost warm start
    #[must_use]
    pub const fn warm() -> Self {
        Self {
            delay: Duration::ZERO,
            warm: true,
        }
    }

    /// Cold start of `ms` milliseconds
    #[must_use]
    pub fn cold_ms(ms: f64) -> Self {
        Self {
            delay: Duration::from_secs_f64(ms.max(0.0) / 1000.0),
            warm: false,
        }
    }
}

/// Source of simulated delays
///
/// Called while the scheduler holds its state lock, so implementations
/// should be cheap and must not block.
pub trait CostModel: Send + Sync + Debug {
    /// Cold-start delay for a new instance
    fn cold_start(&self, function_type: FunctionType, payload_bytes: usize, rng: &mut dyn RngCore) -> ColdStart;

    /// Execution time of the workload
    fn execution(&self, function_type: FunctionType, rng: &mut dyn RngCore) -> Duration;
}

/// Synthetic distribution keyed by function type
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultCostModel {
    /// Chance an instance is reused with zero cold-start cost
    pub warm_start_probability: f64,
    /// Relative jitter applied to cold starts (0.2 = +/-20%)
    pub jitter: f64,
    /// Cold-start cost per KiB of payload
    pub per_kib_ms: f64,
}

impl Default for DefaultCostModel {
    fn default() -> Self {
        Self {
            warm_start_probability: 0.3,
            jitter: 0.2,
            per_kib_ms: 0.5,
        }
    }
}

impl DefaultCostModel {
    /// Model that never warm-starts
    #[must_use]
    pub fn always_cold() -> Self {
        Self {
            warm_start_probability: 0.0,
            ..Self::default()
        }
    }

    /// Base cold-start cost
    #[must_use]
    pub fn base_cold_start_ms(function_type: FunctionType) -> f64 {
        match function_type {
            FunctionType::ApiHandler => 50.0,
            FunctionType::DataProcessing => 120.0,
            FunctionType::MlInference => 400.0,
            FunctionType::QueryExecution => 80.0,
        }
    }

    /// Execution time range `[min, max)`
    #[must_use]
    pub fn execution_range_ms(function_type: FunctionType) -> (f64, f64) {
        match function_type {
            FunctionType::ApiHandler => (5.0, 20.0),
            FunctionType::DataProcessing => (20.0, 80.0),
            FunctionType::MlInference => (50.0, 150.0),
            FunctionType::QueryExecution => (10.0, 40.0),
        }
    }
}

impl CostModel for DefaultCostModel {
    fn cold_start(&self, function_type: FunctionType, payload_bytes: usize, rng: &mut dyn RngCore) -> ColdStart {
        if self.warm_start_probability > 0.0 && rng.gen_bool(self.warm_start_probability.min(1.0)) {
            return ColdStart::warm();
        }
        #[allow(clippy::cast_precision_loss)]
        let kib = payload_bytes as f64 / 1024.0;
        let nominal = Self::base_cold_start_ms(function_type) + kib * self.per_kib_ms;
        let factor = if self.jitter > 0.0 {
            1.0 + rng.gen_range(-self.jitter..=self.jitter)
        } else {
            1.0
        };
        ColdStart::cold_ms(nominal * factor)
    }

    fn execution(&self, function_type: FunctionType, rng: &mut dyn RngCore) -> Duration {
        let (min, max) = Self::execution_range_ms(function_type);
        Duration::from_secs_f64(rng.gen_range(min..max) / 1000.0)
    }
}

/// Fixed delays; useful where timing must be exact
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedCostModel {
    /// Cold-start delay
    pub cold_start: Duration,
    /// Execution time
    pub execution: Duration,
}

impl CostModel for FixedCostModel {
    fn cold_start(&self, _: FunctionType, _: usize, _: &mut dyn RngCore) -> ColdStart {
        ColdStart {
            delay: self.cold_start,
            warm: self.cold_start.is_zero(),
        }
    }

    fn execution(&self, _: FunctionType, _: &mut dyn RngCore) -> Duration {
        self.execution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn cold_start_within_jitter_bounds() {
        let model = DefaultCostModel::always_cold();
        let mut rng = StdRng::seed_from_u64(42);
        for t in FunctionType::ALL {
            let base = DefaultCostModel::base_cold_start_ms(t) + 2.0 * 0.5;
            for _ in 0..100 {
                let draw = model.cold_start(t, 2048, &mut rng);
                let ms = draw.delay.as_secs_f64() * 1000.0;
                assert!(!draw.warm);
                assert!(ms >= base * 0.8 - 1e-6 && ms <= base * 1.2 + 1e-6, "{t}: {ms}");
            }
        }
    }

    #[test]
    fn warm_starts_happen_at_configured_rate() {
        let model = DefaultCostModel::default();
        let mut rng = StdRng::seed_from_u64(7);
        let warm = (0..10_000)
            .filter(|_| model.cold_start(FunctionType::ApiHandler, 0, &mut rng).warm)
            .count();
        assert!((2_500..3_500).contains(&warm), "warm = {warm}");
    }

    #[test]
    fn execution_in_type_range() {
        let model = DefaultCostModel::default();
        let mut rng = StdRng::seed_from_u64(1);
        for t in FunctionType::ALL {
            let (min, max) = DefaultCostModel::execution_range_ms(t);
            let ms = model.execution(t, &mut rng).as_secs_f64() * 1000.0;
            assert!(ms >= min - 1e-6 && ms < max + 1e-6);
        }
    }
}
