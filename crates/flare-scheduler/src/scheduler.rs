//! Function scheduler
//!
//! Owns the active set of ephemeral functions. Every change to the active
//! set, the peak-concurrency counter, the outcome counters and the history
//! ring goes through one `parking_lot::Mutex`; the lock is never held across
//! an await.

use crate::cost::{CostModel, DefaultCostModel};
use crate::error::{SchedulerError, SchedulerResult};
use crate::fault::{FaultInjector, NoFaults};
use crate::function::{
    EphemeralFunction, FunctionHandle, FunctionId, FunctionOutcome, FunctionState, FunctionType,
};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum simultaneously active functions
    pub throttle_limit: usize,
    /// Extinguished functions kept in history
    pub history_capacity: usize,
    /// Seed for cost draws
    pub seed: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            throttle_limit: 1_000,
            history_capacity: 10_000,
            seed: 42,
        }
    }
}

impl SchedulerConfig {
    /// Set throttle limit
    #[must_use]
    pub fn with_throttle_limit(mut self, limit: usize) -> Self {
        self.throttle_limit = limit;
        self
    }

    /// Set seed
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Notified of every active-set change, inside the scheduler lock
pub trait SchedulerObserver: Send + Sync + Debug {
    /// `active` is the new active-set size; `peak` the peak after the change
    fn on_active_change(&self, active: usize, peak: usize);
}

/// Counters snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Currently active
    pub active: usize,
    /// Peak active since start or last reset
    pub peak_concurrency: usize,
    /// Admitted functions
    pub ignited: u64,
    /// Rejected at the throttle limit
    pub throttled: u64,
    /// Extinguished with outcome Completed
    pub completed: u64,
    /// Extinguished with outcome Failed
    pub failed: u64,
    /// Force-extinguished
    pub timed_out: u64,
}

#[derive(Debug)]
struct SchedulerState {
    active: HashMap<FunctionId, EphemeralFunction>,
    history: VecDeque<EphemeralFunction>,
    stats: SchedulerStats,
    executions: u64,
    rng: StdRng,
}

/// Ephemeral function lifecycle driver
#[derive(Debug)]
pub struct FunctionScheduler {
    config: SchedulerConfig,
    cost_model: Arc<dyn CostModel>,
    faults: Arc<dyn FaultInjector>,
    observer: Option<Arc<dyn SchedulerObserver>>,
    state: Mutex<SchedulerState>,
}

impl FunctionScheduler {
    /// Scheduler with the default cost model and no faults
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        let state = SchedulerState {
            active: HashMap::new(),
            history: VecDeque::with_capacity(config.history_capacity.min(1024)),
            stats: SchedulerStats::default(),
            executions: 0,
            rng: StdRng::seed_from_u64(config.seed),
        };
        Self {
            config,
            cost_model: Arc::new(DefaultCostModel::default()),
            faults: Arc::new(NoFaults),
            observer: None,
            state: Mutex::new(state),
        }
    }

    /// Replace the cost model
    #[must_use]
    pub fn with_cost_model(mut self, cost_model: Arc<dyn CostModel>) -> Self {
        self.cost_model = cost_model;
        self
    }

    /// Replace the fault injector
    #[must_use]
    pub fn with_fault_injector(mut self, faults: Arc<dyn FaultInjector>) -> Self {
        self.faults = faults;
        self
    }

    /// Attach an active-set observer
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn SchedulerObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Register a new instance and move it to `ColdStarting`
    ///
    /// # Errors
    /// Returns `Throttled` without registering anything when the active set
    /// is at the throttle limit
    pub fn admit(&self, function_type: FunctionType, payload: serde_json::Value) -> SchedulerResult<FunctionHandle> {
        let payload_bytes = serde_json::to_vec(&payload).map_or(0, |b| b.len());
        let mut state = self.state.lock();
        let active = state.active.len();
        if active >= self.config.throttle_limit {
            state.stats.throttled += 1;
            tracing::debug!(%function_type, active, "ignite throttled");
            return Err(SchedulerError::Throttled {
                limit: self.config.throttle_limit,
                active,
            });
        }

        let mut function = EphemeralFunction::new(function_type, payload);
        function.transition(FunctionState::ColdStarting)?;
        let handle = function.handle(payload_bytes);
        state.active.insert(function.id, function);
        state.stats.ignited += 1;
        let active = state.active.len();
        state.stats.peak_concurrency = state.stats.peak_concurrency.max(active);
        self.notify(&state);
        Ok(handle)
    }

    /// Pay the cold-start cost of an admitted instance
    ///
    /// # Errors
    /// Returns `NotFound` if the instance is no longer active
    pub async fn cold_start(&self, handle: &FunctionHandle) -> SchedulerResult<Duration> {
        let delay = {
            let mut state = self.state.lock();
            let SchedulerState { active, rng, .. } = &mut *state;
            let function = active.get_mut(&handle.id).ok_or(SchedulerError::NotFound(handle.id))?;
            if function.state != FunctionState::ColdStarting {
                return Err(SchedulerError::InvalidTransition {
                    from: function.state,
                    to: FunctionState::ColdStarting,
                });
            }
            let draw = self.cost_model.cold_start(handle.function_type, handle.payload_bytes, rng);
            function.cold_start_ms = draw.delay.as_secs_f64() * 1000.0;
            function.warm_start = draw.warm;
            draw.delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(delay)
    }

    /// Admit and cold-start in one call
    ///
    /// # Errors
    /// Returns `Throttled` at the throttle limit
    pub async fn ignite(&self, function_type: FunctionType, payload: serde_json::Value) -> SchedulerResult<FunctionHandle> {
        let handle = self.admit(function_type, payload)?;
        self.cold_start(&handle).await?;
        Ok(handle)
    }

    /// Run the simulated workload
    ///
    /// # Errors
    /// - `ComputeFailure` if the fault injector fails this execution
    /// - `InvalidTransition` if the instance is not cold-started
    /// - `NotFound` if the instance was extinguished meanwhile
    pub async fn execute(&self, handle: &FunctionHandle) -> SchedulerResult<serde_json::Value> {
        let (duration, sequence) = {
            let mut state = self.state.lock();
            state.executions += 1;
            let sequence = state.executions;
            let SchedulerState { active, rng, .. } = &mut *state;
            let function = active.get_mut(&handle.id).ok_or(SchedulerError::NotFound(handle.id))?;
            function.transition(FunctionState::Executing)?;
            let duration = self.cost_model.execution(handle.function_type, rng);
            function.exec_ms = duration.as_secs_f64() * 1000.0;
            (duration, sequence)
        };

        tokio::time::sleep(duration).await;
        let fault = self.faults.inject(handle, sequence);

        let mut state = self.state.lock();
        let function = state
            .active
            .get_mut(&handle.id)
            .ok_or(SchedulerError::NotFound(handle.id))?;
        match fault {
            None => {
                function.transition(FunctionState::Completed)?;
                let response = serde_json::json!({
                    "function_id": handle.id.to_string(),
                    "function_type": handle.function_type,
                    "exec_ms": function.exec_ms,
                    "status": "ok",
                });
                function.response = Some(response.clone());
                Ok(response)
            }
            Some(reason) => {
                function.transition(FunctionState::Failed)?;
                function.error = Some(reason.clone());
                tracing::debug!(id = %handle.id, %reason, "execution failed");
                Err(SchedulerError::ComputeFailure { id: handle.id, reason })
            }
        }
    }

    /// Remove an instance from the active set and archive it
    ///
    /// Instances that never reached `Completed` or `Failed` are archived as
    /// `Failed`.
    ///
    /// # Errors
    /// Returns `NotFound` if the instance is not active
    pub fn extinguish(&self, handle: &FunctionHandle) -> SchedulerResult<EphemeralFunction> {
        self.remove(handle.id, FunctionOutcome::Failed, "extinguished before completion")
    }

    /// Tear down a still-active instance by id, recording a timeout
    ///
    /// # Errors
    /// Returns `NotFound` if the instance is not active
    pub fn force_extinguish(&self, id: FunctionId) -> SchedulerResult<EphemeralFunction> {
        self.remove(id, FunctionOutcome::Timeout, "timed out")
    }

    fn remove(&self, id: FunctionId, early: FunctionOutcome, reason: &str) -> SchedulerResult<EphemeralFunction> {
        let mut state = self.state.lock();
        let mut function = state.active.remove(&id).ok_or(SchedulerError::NotFound(id))?;
        function.extinguish(early, reason);
        match function.outcome {
            Some(FunctionOutcome::Completed) => state.stats.completed += 1,
            Some(FunctionOutcome::Timeout) => state.stats.timed_out += 1,
            Some(FunctionOutcome::Failed) | None => state.stats.failed += 1,
        }
        if self.config.history_capacity > 0 {
            if state.history.len() == self.config.history_capacity {
                state.history.pop_front();
            }
            state.history.push_back(function.clone());
        }
        self.notify(&state);
        Ok(function)
    }

    fn notify(&self, state: &SchedulerState) {
        if let Some(observer) = &self.observer {
            observer.on_active_change(state.active.len(), state.stats.peak_concurrency);
        }
    }

    /// Counters snapshot
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        let state = self.state.lock();
        SchedulerStats {
            active: state.active.len(),
            ..state.stats
        }
    }

    /// Currently active count
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.state.lock().active.len()
    }

    /// Peak active count since start or last reset
    #[must_use]
    pub fn peak_concurrency(&self) -> usize {
        self.state.lock().stats.peak_concurrency
    }

    /// Reset the peak to the current active count
    pub fn reset_peak(&self) {
        let mut state = self.state.lock();
        state.stats.peak_concurrency = state.active.len();
    }

    /// Ids of active instances
    #[must_use]
    pub fn active_ids(&self) -> Vec<FunctionId> {
        self.state.lock().active.keys().copied().collect()
    }

    /// Snapshot of an active instance
    #[must_use]
    pub fn get(&self, id: FunctionId) -> Option<EphemeralFunction> {
        self.state.lock().active.get(&id).cloned()
    }

    /// Extinguished instances, oldest first
    #[must_use]
    pub fn history(&self) -> Vec<EphemeralFunction> {
        self.state.lock().history.iter().cloned().collect()
    }
}
