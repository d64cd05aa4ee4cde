//! Ramp/sustain load against a fresh scheduler

use crate::config::FlareConfig;
use crate::cost::PredictiveCostModel;
use crate::error::{FlareError, FlareResult};
use flare_coldstart::ColdStartModel;
use flare_scheduler::{
    CancelToken, FunctionScheduler, FunctionType, LoadGenerator, LoadProfile, LoadTestReport,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Largest accepted `target_rps`
pub(crate) const MAX_TARGET_RPS: u32 = 10_000;
/// Largest accepted `payload_bytes`
pub(crate) const MAX_PAYLOAD_BYTES: usize = 64 * 1024;
/// Longest accepted ramp plus sustain
pub(crate) const MAX_RUN_SECONDS: u32 = 3600;

/// Where cold-start delays come from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColdStartSource {
    /// Per-type synthetic distribution
    #[default]
    Synthetic,
    /// Trained cold-start model
    Predicted,
}

/// Parameters of `fireworks_storm`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FireworksParams {
    /// Requests per second once ramped up
    pub target_rps: u32,
    /// Seconds spent ramping up
    pub ramp_seconds: u32,
    /// Seconds at target rate
    pub sustain_seconds: u32,
    /// Function types cycled through
    pub function_types: Vec<FunctionType>,
    /// Padding per request payload
    pub payload_bytes: usize,
    /// Overrides the configured success threshold
    pub success_threshold: Option<f64>,
    /// Overrides the configured throttle limit
    pub throttle_limit: Option<usize>,
    /// Overrides the configured seed
    pub seed: Option<u64>,
    /// Synthetic or model-predicted cold starts
    pub cold_start_source: ColdStartSource,
}

impl Default for FireworksParams {
    fn default() -> Self {
        Self {
            target_rps: 500,
            ramp_seconds: 5,
            sustain_seconds: 10,
            function_types: FunctionType::ALL.to_vec(),
            payload_bytes: 1024,
            success_threshold: None,
            throttle_limit: None,
            seed: None,
            cold_start_source: ColdStartSource::Synthetic,
        }
    }
}

impl FireworksParams {
    pub(crate) fn validate(&self) -> FlareResult<()> {
        if self.success_threshold.is_some_and(|t| !(t > 0.0 && t <= 1.0)) {
            return Err(FlareError::invalid("success_threshold must be in (0, 1]"));
        }
        if self.throttle_limit == Some(0) {
            return Err(FlareError::invalid("throttle_limit must be at least 1"));
        }
        if self.target_rps > MAX_TARGET_RPS {
            return Err(FlareError::invalid(format!(
                "target_rps must be at most {MAX_TARGET_RPS}, got {}",
                self.target_rps
            )));
        }
        if self.payload_bytes > MAX_PAYLOAD_BYTES {
            return Err(FlareError::invalid(format!(
                "payload_bytes must be at most {MAX_PAYLOAD_BYTES}, got {}",
                self.payload_bytes
            )));
        }
        let run_seconds = u64::from(self.ramp_seconds) + u64::from(self.sustain_seconds);
        if run_seconds > u64::from(MAX_RUN_SECONDS) {
            return Err(FlareError::invalid(format!(
                "ramp_seconds + sustain_seconds must be at most {MAX_RUN_SECONDS}, got {run_seconds}"
            )));
        }
        self.profile(0.95, 30)
            .validate()
            .map_err(|e| FlareError::invalid(e.to_string()))
    }

    fn profile(&self, success_threshold: f64, drain_timeout_secs: u64) -> LoadProfile {
        LoadProfile {
            target_rps: self.target_rps,
            ramp_seconds: self.ramp_seconds,
            sustain_seconds: self.sustain_seconds,
            function_types: self.function_types.clone(),
            payload_bytes: self.payload_bytes,
            success_threshold: self.success_threshold.unwrap_or(success_threshold),
            drain_timeout_secs,
        }
    }
}

/// Result of `fireworks_storm`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FireworksResult {
    /// Load generator output
    pub report: LoadTestReport,
    /// Where cold starts came from
    pub cold_start_source: ColdStartSource,
    /// Throttle limit of the scheduler used
    pub throttle_limit: usize,
    /// No throttling and success rate strictly above the threshold
    pub passed: bool,
}

/// Run the load test; `model` is required for predicted cold starts
pub(crate) async fn run(
    config: &FlareConfig,
    params: &FireworksParams,
    model: Option<&ColdStartModel>,
    cancel: &CancelToken,
) -> FlareResult<FireworksResult> {
    params.validate()?;
    let mut scheduler_config = config.scheduler_config();
    if let Some(limit) = params.throttle_limit {
        scheduler_config.throttle_limit = limit;
    }
    if let Some(seed) = params.seed {
        scheduler_config.seed = seed;
    }
    let throttle_limit = scheduler_config.throttle_limit;

    let mut scheduler = FunctionScheduler::new(scheduler_config);
    if params.cold_start_source == ColdStartSource::Predicted {
        let model = model.ok_or_else(|| {
            FlareError::invalid("predicted cold starts need a trained cold-start model")
        })?;
        scheduler = scheduler.with_cost_model(Arc::new(PredictiveCostModel::new(model)?));
    }

    let profile = params.profile(config.success_threshold, config.drain_timeout_secs);
    info!(
        target_rps = profile.target_rps,
        ramp = profile.ramp_seconds,
        sustain = profile.sustain_seconds,
        throttle_limit,
        source = ?params.cold_start_source,
        "fireworks storm starting"
    );
    let report = LoadGenerator::new(Arc::new(scheduler))
        .run(&profile, cancel)
        .await?;

    let passed = !report.cancelled
        && report.throttling_count == 0
        && report.success_rate > profile.success_threshold;
    if report.throttling_count > 0 {
        warn!(throttled = report.throttling_count, limit = throttle_limit, "requests were throttled");
    }
    info!(
        sent = report.requests_sent,
        success_rate = report.success_rate,
        peak = report.peak_concurrency,
        passed,
        "fireworks storm finished"
    );
    Ok(FireworksResult {
        report,
        cold_start_source: params.cold_start_source,
        throttle_limit,
        passed,
    })
}
