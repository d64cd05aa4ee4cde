//! Validation orchestrator
//!
//! Owns one [`Registry`], the job table and the most recently trained
//! cold-start model. Every scenario can be run inline (`run`) or as a job
//! (`submit_test`).

use crate::config::FlareConfig;
use crate::error::{FlareError, FlareResult};
use crate::jobs::{JobId, JobRegistry, ValidationReport};
use crate::registry::Registry;
use crate::scenarios::{
    run_fireworks, run_massive_query, run_versioning, train_cold_start,
    ColdStartParams, ColdStartResult, ColdStartSource, FireworksParams, FireworksResult,
    FullValidationParams, FullValidationResult, MassiveQueryParams, MassiveQueryResult,
    ScenarioEntry, ScenarioResult, TestKind, TestParams, VersioningParams, VersioningResult,
};
use flare_coldstart::ColdStartModel;
use flare_scheduler::CancelToken;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info};

/// Liveness summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Overall status
    pub status: String,
    /// Crate version
    pub version: String,
    /// Per-component status
    pub components: BTreeMap<String, String>,
}

/// Runs validation scenarios and tracks jobs
#[derive(Debug)]
pub struct ValidationOrchestrator {
    config: FlareConfig,
    registry: Registry,
    jobs: JobRegistry,
    model: RwLock<Option<Arc<ColdStartModel>>>,
}

impl ValidationOrchestrator {
    /// Orchestrator with a registry built from `config`
    ///
    /// # Errors
    /// `Config` if the configuration does not validate
    pub fn new(config: FlareConfig) -> FlareResult<Self> {
        let registry = Registry::new(&config);
        Self::with_registry(config, registry)
    }

    /// Orchestrator over an existing registry
    ///
    /// # Errors
    /// `Config` if the configuration does not validate
    pub fn with_registry(config: FlareConfig, registry: Registry) -> FlareResult<Self> {
        config.validate()?;
        Ok(Self {
            jobs: JobRegistry::new(Duration::from_secs(config.job_timeout_secs)),
            config,
            registry,
            model: RwLock::new(None),
        })
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &FlareConfig {
        &self.config
    }

    /// Data plane
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Model trained by the last `cold_start_validation`, if any
    #[must_use]
    pub fn trained_model(&self) -> Option<Arc<ColdStartModel>> {
        self.model.read().clone()
    }

    /// Create a dataset and query it concurrently
    ///
    /// # Errors
    /// Invalid parameters or a failed dataset creation
    pub async fn massive_query(
        &self,
        params: &MassiveQueryParams,
        cancel: &CancelToken,
    ) -> FlareResult<MassiveQueryResult> {
        run_massive_query(&self.registry, &self.config, params, cancel).await
    }

    /// Train the cold-start model and keep it for predicted load tests
    ///
    /// # Errors
    /// Invalid parameters or a training failure
    pub async fn cold_start_validation(&self, params: &ColdStartParams) -> FlareResult<ColdStartResult> {
        let (model, result) = train_cold_start(&self.config, params).await?;
        *self.model.write() = Some(Arc::new(model));
        Ok(result)
    }

    /// Load test a fresh scheduler
    ///
    /// Predicted cold starts reuse the last trained model, training one
    /// with default parameters if there is none yet.
    ///
    /// # Errors
    /// Invalid parameters or a model failure
    pub async fn fireworks_storm(
        &self,
        params: &FireworksParams,
        cancel: &CancelToken,
    ) -> FlareResult<FireworksResult> {
        let model = match params.cold_start_source {
            ColdStartSource::Synthetic => None,
            ColdStartSource::Predicted => match self.trained_model() {
                Some(model) => Some(model),
                None => {
                    let seed = params.seed.or(Some(self.config.random_seed));
                    let training = ColdStartParams {
                        seed,
                        ..ColdStartParams::default()
                    };
                    let (model, _) = train_cold_start(&self.config, &training).await?;
                    let model = Arc::new(model);
                    *self.model.write() = Some(Arc::clone(&model));
                    Some(model)
                }
            },
        };
        run_fireworks(&self.config, params, model.as_deref(), cancel).await
    }

    /// Version, verify, roll back and verify again
    ///
    /// # Errors
    /// Invalid parameters or a store failure
    pub async fn immutability_versioning(&self, params: &VersioningParams) -> FlareResult<VersioningResult> {
        run_versioning(&self.registry, params).await
    }

    /// All four scenarios in order; a scenario error becomes that entry's `error`
    pub async fn full_validation(
        &self,
        params: &FullValidationParams,
        cancel: &CancelToken,
    ) -> FullValidationResult {
        // Futures are lazy; each step starts only when the loop awaits it.
        let steps: [(TestKind, BoxFuture<'_, FlareResult<ScenarioResult>>); 4] = [
            (
                TestKind::MassiveQuery,
                self.massive_query(&params.massive_query, cancel)
                    .map(|r| r.map(ScenarioResult::MassiveQuery))
                    .boxed(),
            ),
            (
                TestKind::ColdStartValidation,
                self.cold_start_validation(&params.cold_start_validation)
                    .map(|r| r.map(ScenarioResult::ColdStartValidation))
                    .boxed(),
            ),
            (
                TestKind::FireworksStorm,
                self.fireworks_storm(&params.fireworks_storm, cancel)
                    .map(|r| r.map(ScenarioResult::FireworksStorm))
                    .boxed(),
            ),
            (
                TestKind::ImmutabilityVersioning,
                self.immutability_versioning(&params.immutability_versioning)
                    .map(|r| r.map(ScenarioResult::ImmutabilityVersioning))
                    .boxed(),
            ),
        ];
        let mut entries = Vec::with_capacity(steps.len());
        for (kind, step) in steps {
            let started = Instant::now();
            let outcome = if cancel.is_cancelled() {
                Err(FlareError::Cancelled)
            } else {
                step.await
            };
            let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
            entries.push(match outcome {
                Ok(result) => ScenarioEntry {
                    test_type: kind,
                    passed: result.passed(),
                    result: Some(Box::new(result)),
                    error: None,
                    duration_ms,
                },
                Err(e) => {
                    error!(test = %kind, error = %e, "scenario errored");
                    ScenarioEntry {
                        test_type: kind,
                        passed: false,
                        result: None,
                        error: Some(e.to_string()),
                        duration_ms,
                    }
                }
            });
        }
        let result = FullValidationResult::from_entries(entries);
        info!(
            passed = result.tests_passed,
            total = result.tests_total,
            all_passed = result.all_passed,
            "full validation finished"
        );
        result
    }

    /// Run one scenario inline
    ///
    /// # Errors
    /// Whatever the scenario returns; `full_validation` never errors
    pub async fn run(&self, params: TestParams, cancel: &CancelToken) -> FlareResult<ScenarioResult> {
        params.validate()?;
        match params {
            TestParams::MassiveQuery(p) => self.massive_query(&p, cancel).await.map(ScenarioResult::MassiveQuery),
            TestParams::ColdStartValidation(p) => self
                .cold_start_validation(&p)
                .await
                .map(ScenarioResult::ColdStartValidation),
            TestParams::FireworksStorm(p) => self
                .fireworks_storm(&p, cancel)
                .await
                .map(ScenarioResult::FireworksStorm),
            TestParams::ImmutabilityVersioning(p) => self
                .immutability_versioning(&p)
                .await
                .map(ScenarioResult::ImmutabilityVersioning),
            TestParams::FullValidation(p) => Ok(ScenarioResult::FullValidation(
                self.full_validation(&p, cancel).await,
            )),
        }
    }

    /// Parse `body` for `kind` and start it as a job
    ///
    /// # Errors
    /// `InvalidParams` if the body does not parse or validate
    pub fn submit_test(self: &Arc<Self>, kind: TestKind, body: serde_json::Value) -> FlareResult<JobId> {
        let params = TestParams::parse(kind, body)?;
        Ok(self.submit(params))
    }

    /// Start already parsed parameters as a job
    pub fn submit(self: &Arc<Self>, params: TestParams) -> JobId {
        let this = Arc::clone(self);
        self.jobs.submit(params.kind(), move |cancel| async move {
            this.run(params, &cancel).await
        })
    }

    /// Job snapshot
    #[must_use]
    pub fn get_job(&self, id: JobId) -> Option<ValidationReport> {
        self.jobs.get(id)
    }

    /// Request cooperative cancellation of a job
    ///
    /// # Errors
    /// `JobNotFound` for an unknown id
    pub fn cancel_job(&self, id: JobId) -> FlareResult<()> {
        self.jobs.cancel(id)
    }

    /// Every job, oldest first
    #[must_use]
    pub fn list_jobs(&self) -> Vec<ValidationReport> {
        self.jobs.list()
    }

    /// Wait for a job to finish
    ///
    /// # Errors
    /// `JobNotFound` for an unknown id
    pub async fn wait_job(&self, id: JobId) -> FlareResult<ValidationReport> {
        self.jobs.wait(id).await
    }

    /// Component status
    #[must_use]
    pub fn health(&self) -> HealthReport {
        let components = [
            "partition_store",
            "version_registry",
            "function_scheduler",
            "cold_start_model",
            "orchestrator",
        ]
        .into_iter()
        .map(|c| (c.to_string(), "ready".to_string()))
        .collect();
        HealthReport {
            status: "ok".to_string(),
            version: crate::VERSION.to_string(),
            components,
        }
    }
}
