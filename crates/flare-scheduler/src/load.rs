//! Ramp/sustain load generation
//!
//! A run issues one batch of requests per second: a linear ramp up to the
//! target rate, then a flat sustain phase. Every request is one
//! `admit -> cold_start -> execute -> extinguish` unit on its own task.
//! Admission happens on the generator's task, so throttling is counted the
//! moment it happens and every in-flight id is known if the drain times out.

use crate::cancel::CancelToken;
use crate::error::{SchedulerError, SchedulerResult};
use crate::function::{FunctionHandle, FunctionId, FunctionOutcome, FunctionType};
use crate::metrics::LatencySummary;
use crate::scheduler::FunctionScheduler;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;

/// Load profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadProfile {
    /// Requests per second once ramped up
    pub target_rps: u32,
    /// Seconds spent ramping up
    pub ramp_seconds: u32,
    /// Seconds spent at target rate
    pub sustain_seconds: u32,
    /// Function types cycled through, in order
    pub function_types: Vec<FunctionType>,
    /// Padding added to every request payload
    pub payload_bytes: usize,
    /// Minimum success rate for a pass
    pub success_threshold: f64,
    /// Bound on waiting for in-flight requests after the last batch
    pub drain_timeout_secs: u64,
}

impl Default for LoadProfile {
    fn default() -> Self {
        Self {
            target_rps: 100,
            ramp_seconds: 5,
            sustain_seconds: 10,
            function_types: FunctionType::ALL.to_vec(),
            payload_bytes: 1024,
            success_threshold: 0.95,
            drain_timeout_secs: 30,
        }
    }
}

impl LoadProfile {
    /// Check the profile is runnable
    ///
    /// # Errors
    /// Returns `InvalidConfig` describing the first problem
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.target_rps == 0 {
            return Err(SchedulerError::InvalidConfig("target_rps must be positive".into()));
        }
        if self.ramp_seconds == 0 && self.sustain_seconds == 0 {
            return Err(SchedulerError::InvalidConfig(
                "ramp_seconds and sustain_seconds cannot both be zero".into(),
            ));
        }
        if self.function_types.is_empty() {
            return Err(SchedulerError::InvalidConfig("function_types must not be empty".into()));
        }
        if !(self.success_threshold > 0.0 && self.success_threshold <= 1.0) {
            return Err(SchedulerError::InvalidConfig(
                "success_threshold must be in (0, 1]".into(),
            ));
        }
        Ok(())
    }
}

/// Phase of a load run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPhase {
    /// Rate climbing toward target
    Ramp,
    /// Rate held at target
    Sustain,
}

/// One second of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRecord {
    /// Phase the second belongs to
    pub phase: LoadPhase,
    /// Second index from the start of the run
    pub second: u32,
    /// Requests issued (admitted plus throttled)
    pub requests_issued: u32,
    /// Requests rejected at the throttle limit
    pub throttled: u32,
}

/// Per-second request counts for a profile, ramp then sustain
///
/// Ramp second `s` issues `round(target * (s + 1) / ramp)`.
#[must_use]
pub fn expected_requests(profile: &LoadProfile) -> Vec<(LoadPhase, u32)> {
    let ramp = (0..profile.ramp_seconds).map(|s| {
        let share = f64::from(profile.target_rps) * f64::from(s + 1) / f64::from(profile.ramp_seconds);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let count = share.round() as u32;
        (LoadPhase::Ramp, count)
    });
    let sustain = (0..profile.sustain_seconds).map(|_| (LoadPhase::Sustain, profile.target_rps));
    ramp.chain(sustain).collect()
}

/// Aggregate result of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadTestReport {
    /// Profile that was run
    pub profile: LoadProfile,
    /// Requests issued, including throttled ones
    pub requests_sent: u64,
    /// Requests that completed
    pub requests_completed: u64,
    /// Requests that failed
    pub requests_failed: u64,
    /// Requests rejected at the throttle limit
    pub throttling_count: u64,
    /// Requests force-extinguished after the drain timeout
    pub timeouts: u64,
    /// `requests_completed / requests_sent`
    pub success_rate: f64,
    /// Execution latency (cold start excluded)
    pub exec_latency: LatencySummary,
    /// Cold-start latency of instances that were not warm
    pub cold_start_latency: LatencySummary,
    /// Instances that skipped the cold start
    pub warm_starts: u64,
    /// Largest active set observed during the run
    pub peak_concurrency: usize,
    /// Wall time of the run
    pub duration_ms: f64,
    /// Run was cancelled before issuing every batch
    pub cancelled: bool,
    /// Per-second records
    pub phases: Vec<PhaseRecord>,
    /// `throttling_count == 0 && success_rate >= success_threshold`
    pub test_passed: bool,
}

impl LoadTestReport {
    /// Human-readable summary
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();
        report.push_str("=== Load Test Report ===\n\n");
        report.push_str(&format!(
            "Profile: {} rps, ramp {}s, sustain {}s\n",
            self.profile.target_rps, self.profile.ramp_seconds, self.profile.sustain_seconds
        ));
        report.push_str(&format!("Requests Sent: {}\n", self.requests_sent));
        report.push_str(&format!("Completed: {}\n", self.requests_completed));
        report.push_str(&format!("Failed: {}\n", self.requests_failed));
        report.push_str(&format!("Throttled: {}\n", self.throttling_count));
        report.push_str(&format!("Timeouts: {}\n", self.timeouts));
        report.push_str(&format!("Success Rate: {:.2}%\n", self.success_rate * 100.0));
        report.push_str(&format!(
            "Exec p50/p95/p99: {:.1}/{:.1}/{:.1} ms\n",
            self.exec_latency.p50_ms, self.exec_latency.p95_ms, self.exec_latency.p99_ms
        ));
        report.push_str(&format!("Peak Concurrency: {}\n", self.peak_concurrency));
        if self.cancelled {
            report.push_str("Run was cancelled\n");
        }
        report.push_str(&format!(
            "\n=== Result: {} ===\n",
            if self.test_passed { "PASS" } else { "FAIL" }
        ));
        report
    }
}

#[derive(Debug)]
struct UnitResult {
    id: FunctionId,
    outcome: FunctionOutcome,
    cold_start_ms: Option<f64>,
    warm: bool,
    exec_ms: Option<f64>,
}

#[derive(Debug, Default)]
struct Tally {
    completed: u64,
    failed: u64,
    timeouts: u64,
    warm_starts: u64,
    exec: Vec<f64>,
    cold: Vec<f64>,
}

impl Tally {
    fn record(&mut self, unit: UnitResult) {
        match unit.outcome {
            FunctionOutcome::Completed => self.completed += 1,
            FunctionOutcome::Failed => self.failed += 1,
            FunctionOutcome::Timeout => self.timeouts += 1,
        }
        if unit.warm {
            self.warm_starts += 1;
        } else if let Some(ms) = unit.cold_start_ms {
            self.cold.push(ms);
        }
        if let Some(ms) = unit.exec_ms {
            self.exec.push(ms);
        }
    }
}

/// Drives a [`FunctionScheduler`] through a [`LoadProfile`]
#[derive(Debug, Clone)]
pub struct LoadGenerator {
    scheduler: Arc<FunctionScheduler>,
}

impl LoadGenerator {
    /// Generator over a scheduler
    #[must_use]
    pub fn new(scheduler: Arc<FunctionScheduler>) -> Self {
        Self { scheduler }
    }

    /// Scheduler driven
    #[inline]
    #[must_use]
    pub fn scheduler(&self) -> &Arc<FunctionScheduler> {
        &self.scheduler
    }

    /// Run a profile to completion (or cancellation)
    ///
    /// Throttling, injected failures and drain timeouts are outcomes in the
    /// report, not errors.
    ///
    /// # Errors
    /// Returns `InvalidConfig` for an unrunnable profile
    pub async fn run(&self, profile: &LoadProfile, cancel: &CancelToken) -> SchedulerResult<LoadTestReport> {
        profile.validate()?;
        let schedule = expected_requests(profile);
        tracing::info!(
            target_rps = profile.target_rps,
            ramp_seconds = profile.ramp_seconds,
            sustain_seconds = profile.sustain_seconds,
            expected = schedule.iter().map(|(_, n)| u64::from(*n)).sum::<u64>(),
            "load test starting"
        );

        self.scheduler.reset_peak();
        let started = Instant::now();
        let mut units: JoinSet<UnitResult> = JoinSet::new();
        let mut pending: HashSet<FunctionId> = HashSet::new();
        let mut phases = Vec::with_capacity(schedule.len());
        let mut throttled_total = 0_u64;
        let mut sequence = 0_usize;

        for (second, (phase, count)) in schedule.iter().copied().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            let tick = started + Duration::from_secs(second as u64);
            let mut throttled = 0_u32;

            for _ in 0..count {
                let function_type = profile.function_types[sequence % profile.function_types.len()];
                let payload = request_payload(sequence, profile.payload_bytes);
                sequence += 1;
                match self.scheduler.admit(function_type, payload) {
                    Ok(handle) => {
                        pending.insert(handle.id);
                        units.spawn(run_unit(Arc::clone(&self.scheduler), handle));
                    }
                    Err(SchedulerError::Throttled { .. }) => throttled += 1,
                    Err(e) => return Err(e),
                }
            }
            throttled_total += u64::from(throttled);
            if throttled > 0 {
                tracing::warn!(second, throttled, "requests throttled");
            }
            phases.push(PhaseRecord {
                phase,
                second: u32::try_from(second).unwrap_or(u32::MAX),
                requests_issued: count,
                throttled,
            });

            tokio::select! {
                () = tokio::time::sleep_until(tick + Duration::from_secs(1)) => {}
                () = cancel.cancelled() => {}
            }
        }
        let cancelled = phases.len() < schedule.len();
        if cancelled {
            tracing::info!(issued_seconds = phases.len(), "load test cancelled");
        }

        let mut tally = Tally::default();
        let drain = Duration::from_secs(profile.drain_timeout_secs);
        let deadline = Instant::now() + drain;
        let mut drain_expired = false;
        loop {
            match tokio::time::timeout_at(deadline, units.join_next()).await {
                Ok(Some(Ok(unit))) => {
                    pending.remove(&unit.id);
                    tally.record(unit);
                }
                Ok(Some(Err(e))) => tracing::error!(error = %e, "load unit task failed"),
                Ok(None) => break,
                Err(_) => {
                    drain_expired = true;
                    break;
                }
            }
        }

        if drain_expired {
            tracing::warn!(
                in_flight = pending.len(),
                drain_timeout_secs = profile.drain_timeout_secs,
                "drain timed out, force-extinguishing"
            );
            units.abort_all();
            while let Some(joined) = units.join_next().await {
                if let Ok(unit) = joined {
                    pending.remove(&unit.id);
                    tally.record(unit);
                }
            }
        }
        // anything left either outlived the drain or lost its task
        let leftover = if drain_expired {
            FunctionOutcome::Timeout
        } else {
            FunctionOutcome::Failed
        };
        for id in pending.drain() {
            if self.scheduler.force_extinguish(id).is_err() {
                tracing::debug!(%id, "unit already extinguished");
            }
            tally.record(UnitResult {
                id,
                outcome: leftover,
                cold_start_ms: None,
                warm: false,
                exec_ms: None,
            });
        }

        let requests_sent = tally.completed + tally.failed + tally.timeouts + throttled_total;
        #[allow(clippy::cast_precision_loss)]
        let success_rate = if requests_sent == 0 {
            0.0
        } else {
            tally.completed as f64 / requests_sent as f64
        };
        let report = LoadTestReport {
            profile: profile.clone(),
            requests_sent,
            requests_completed: tally.completed,
            requests_failed: tally.failed,
            throttling_count: throttled_total,
            timeouts: tally.timeouts,
            success_rate,
            exec_latency: LatencySummary::from_samples(&tally.exec),
            cold_start_latency: LatencySummary::from_samples(&tally.cold),
            warm_starts: tally.warm_starts,
            peak_concurrency: self.scheduler.peak_concurrency(),
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
            cancelled,
            phases,
            test_passed: throttled_total == 0 && success_rate >= profile.success_threshold,
        };
        tracing::info!(
            requests_sent = report.requests_sent,
            success_rate = report.success_rate,
            throttled = report.throttling_count,
            timeouts = report.timeouts,
            peak = report.peak_concurrency,
            passed = report.test_passed,
            "load test finished"
        );
        Ok(report)
    }
}

fn request_payload(sequence: usize, padding: usize) -> serde_json::Value {
    serde_json::json!({
        "request": sequence,
        "body": "x".repeat(padding),
    })
}

async fn run_unit(scheduler: Arc<FunctionScheduler>, handle: FunctionHandle) -> UnitResult {
    let cold = scheduler.cold_start(&handle).await;
    let executed = if cold.is_ok() {
        scheduler.execute(&handle).await.is_ok()
    } else {
        false
    };
    let record = scheduler.extinguish(&handle);
    match record {
        Ok(record) => UnitResult {
            id: handle.id,
            outcome: record.outcome.unwrap_or(FunctionOutcome::Failed),
            cold_start_ms: Some(record.cold_start_ms),
            warm: record.warm_start,
            exec_ms: (record.exec_ms > 0.0).then_some(record.exec_ms),
        },
        Err(_) => UnitResult {
            id: handle.id,
            outcome: if executed {
                FunctionOutcome::Completed
            } else {
                FunctionOutcome::Failed
            },
            cold_start_ms: None,
            warm: false,
            exec_ms: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_is_linear_and_rounded() {
        let profile = LoadProfile {
            target_rps: 50,
            ramp_seconds: 3,
            sustain_seconds: 2,
            ..LoadProfile::default()
        };
        let counts: Vec<u32> = expected_requests(&profile).into_iter().map(|(_, n)| n).collect();
        assert_eq!(counts, vec![17, 33, 50, 50, 50]);
    }

    #[test]
    fn zero_ramp_goes_straight_to_sustain() {
        let profile = LoadProfile {
            target_rps: 10,
            ramp_seconds: 0,
            sustain_seconds: 2,
            ..LoadProfile::default()
        };
        assert_eq!(
            expected_requests(&profile),
            vec![(LoadPhase::Sustain, 10), (LoadPhase::Sustain, 10)]
        );
    }

    #[test]
    fn validation() {
        assert!(LoadProfile::default().validate().is_ok());
        let bad = LoadProfile {
            target_rps: 0,
            ..LoadProfile::default()
        };
        assert!(bad.validate().is_err());
        let bad = LoadProfile {
            success_threshold: 1.5,
            ..LoadProfile::default()
        };
        assert!(bad.validate().is_err());
    }
}
