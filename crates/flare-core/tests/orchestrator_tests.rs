use flare_core::prelude::*;
use flare_core::{
    ColdStartParams, ColdStartSource, FireworksParams, FullValidationParams, MassiveQueryParams,
    VersioningParams,
};
use flare_scheduler::{expected_requests, FunctionType};
use flare_test_utils::{instant_query_config, short_load_profile, small_store_config, source_corpus};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn test_config() -> FlareConfig {
    FlareConfig {
        store: small_store_config(),
        query: instant_query_config(),
        ..FlareConfig::default()
    }
}

fn orchestrator() -> Arc<ValidationOrchestrator> {
    Arc::new(ValidationOrchestrator::new(test_config()).unwrap())
}

fn small_massive_query() -> MassiveQueryParams {
    MassiveQueryParams {
        size_gb: 1.0 / 1024.0,
        min_partitions: 4,
        concurrent_queries: 5,
        ..MassiveQueryParams::default()
    }
}

fn small_versioning() -> VersioningParams {
    VersioningParams {
        size_mb: 1,
        ..VersioningParams::default()
    }
}

fn quick_fireworks(target_rps: u32) -> FireworksParams {
    let profile = short_load_profile(target_rps);
    FireworksParams {
        target_rps,
        ramp_seconds: profile.ramp_seconds,
        sustain_seconds: profile.sustain_seconds,
        payload_bytes: profile.payload_bytes,
        ..FireworksParams::default()
    }
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = FlareConfig {
        throttle_limit: 0,
        ..test_config()
    };
    let err = ValidationOrchestrator::new(config).unwrap_err();
    assert!(matches!(err, FlareError::Config(_)));
}

#[test]
fn test_health_reports_every_component() {
    let health = orchestrator().health();
    assert_eq!(health.status, "ok");
    assert_eq!(health.components.len(), 5);
    assert!(health.components.values().all(|s| s == "ready"));
    assert!(health.components.contains_key("cold_start_model"));
}

#[tokio::test]
async fn test_versioning_scenario_passes() {
    let orch = orchestrator();
    let result = orch
        .run(TestParams::ImmutabilityVersioning(small_versioning()), &CancelToken::new())
        .await
        .unwrap();
    let ScenarioResult::ImmutabilityVersioning(result) = result else {
        panic!("unexpected result kind");
    };
    assert_eq!(result.original_version, 1);
    assert_eq!(result.modified_version, 2);
    assert_eq!(result.rolled_back_to, 1);
    assert!(result.modifications_applied);
    assert!(result.original_data_intact);
    assert!(result.checksums_match);
    assert!(result.passed);
}

#[tokio::test]
async fn test_massive_query_runs_every_query() {
    let orch = orchestrator();
    let result = orch
        .massive_query(&small_massive_query(), &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(result.queries_requested, 5);
    assert_eq!(result.queries_completed, 5);
    assert_eq!(result.queries_failed, 0);
    assert!(result.partitions >= 4);
    assert!(result.passed, "{}", result.generate_text());

    // generated dataset is dropped once the queries return
    assert!(orch.registry().versions().resolve(&result.dataset).is_err());
    assert!(orch.registry().versions().is_empty());
}

#[tokio::test]
async fn test_named_dataset_is_kept() {
    let orch = orchestrator();
    let params = MassiveQueryParams {
        dataset_name: Some("kept".into()),
        ..small_massive_query()
    };
    let result = orch.massive_query(&params, &CancelToken::new()).await.unwrap();
    assert_eq!(result.dataset, "kept");
    let resolved = orch.registry().versions().resolve("kept").unwrap();
    assert_eq!(resolved.version, result.version);
}

#[tokio::test]
async fn test_scratch_datasets_do_not_accumulate() {
    let orch = orchestrator();
    let before = orch.registry().versions().len();
    for _ in 0..3 {
        orch.immutability_versioning(&small_versioning()).await.unwrap();
        orch.massive_query(&small_massive_query(), &CancelToken::new())
            .await
            .unwrap();
    }
    assert_eq!(orch.registry().versions().len(), before);
}

#[tokio::test]
async fn test_oversized_versioning_is_rejected_before_work() {
    let orch = orchestrator();
    for size_mb in [1_u64 << 44, u64::MAX] {
        let params = VersioningParams {
            size_mb,
            ..small_versioning()
        };
        let err = orch.immutability_versioning(&params).await.unwrap_err();
        assert!(matches!(err, FlareError::InvalidParams(_)), "{err}");

        let body = serde_json::json!({ "size_mb": size_mb });
        let err = orch.submit_test(TestKind::ImmutabilityVersioning, body).unwrap_err();
        assert!(matches!(err, FlareError::InvalidParams(_)), "{err}");
    }
    assert!(orch.list_jobs().is_empty());
    assert!(orch.registry().versions().is_empty());
}

#[tokio::test]
async fn test_cold_start_keeps_trained_model() {
    let orch = orchestrator();
    assert!(orch.trained_model().is_none());
    let params = ColdStartParams {
        corpus_size: 50,
        ..ColdStartParams::default()
    };
    let result = orch.cold_start_validation(&params).await.unwrap();
    assert_eq!(result.samples, 50);
    assert!(!result.from_source);
    assert_eq!(result.top_slow.len(), 3);
    assert!(result.passed, "best r2 = {}", result.best_r2);
    assert!(orch.trained_model().is_some_and(|m| m.is_trained()));
}

#[tokio::test]
async fn test_cold_start_profiles_source_units() {
    let orch = orchestrator();
    let params = ColdStartParams {
        source_units: source_corpus(24),
        ..ColdStartParams::default()
    };
    let result = orch.cold_start_validation(&params).await.unwrap();
    assert!(result.from_source);
    assert_eq!(result.samples, 24);
    assert!(result.best_r2.is_finite());
}

#[tokio::test]
async fn test_too_few_source_units_is_invalid() {
    let orch = orchestrator();
    let params = ColdStartParams {
        source_units: source_corpus(3),
        ..ColdStartParams::default()
    };
    let err = orch.cold_start_validation(&params).await.unwrap_err();
    assert!(matches!(err, FlareError::InvalidParams(_)));
}

#[tokio::test(start_paused = true)]
async fn test_fireworks_storm_sends_the_schedule() {
    let orch = orchestrator();
    let params = quick_fireworks(40);
    let result = orch.fireworks_storm(&params, &CancelToken::new()).await.unwrap();

    let expected: u32 = expected_requests(&short_load_profile(40)).iter().map(|(_, n)| n).sum();
    assert_eq!(result.report.requests_sent, u64::from(expected));
    assert_eq!(result.report.throttling_count, 0);
    assert_eq!(result.cold_start_source, ColdStartSource::Synthetic);
    assert!(result.passed, "{}", result.generate_text());
}

#[tokio::test(start_paused = true)]
async fn test_fireworks_storm_fails_when_throttled() {
    let orch = orchestrator();
    let params = FireworksParams {
        throttle_limit: Some(2),
        function_types: vec![FunctionType::MlInference],
        ..quick_fireworks(40)
    };
    let result = orch.fireworks_storm(&params, &CancelToken::new()).await.unwrap();
    assert!(result.report.throttling_count > 0);
    assert_eq!(result.throttle_limit, 2);
    assert!(!result.passed);
}

#[tokio::test(start_paused = true)]
async fn test_predicted_fireworks_trains_a_model_on_demand() {
    let orch = orchestrator();
    let params = FireworksParams {
        cold_start_source: ColdStartSource::Predicted,
        ..quick_fireworks(20)
    };
    let result = orch.fireworks_storm(&params, &CancelToken::new()).await.unwrap();
    assert_eq!(result.cold_start_source, ColdStartSource::Predicted);
    assert!(orch.trained_model().is_some());
    assert!(result.report.requests_sent > 0);
}

#[tokio::test(start_paused = true)]
async fn test_full_validation_runs_all_four_in_order() {
    let orch = orchestrator();
    let params = FullValidationParams {
        massive_query: small_massive_query(),
        cold_start_validation: ColdStartParams {
            corpus_size: 50,
            ..ColdStartParams::default()
        },
        fireworks_storm: quick_fireworks(50),
        immutability_versioning: small_versioning(),
    };
    let full = orch.full_validation(&params, &CancelToken::new()).await;

    let order: Vec<TestKind> = full.tests.iter().map(|t| t.test_type).collect();
    assert_eq!(
        order,
        vec![
            TestKind::MassiveQuery,
            TestKind::ColdStartValidation,
            TestKind::FireworksStorm,
            TestKind::ImmutabilityVersioning,
        ]
    );
    assert_eq!(full.tests_total, 4);
    assert!(full.tests.iter().all(|t| t.error.is_none()));

    let Some(ScenarioResult::FireworksStorm(storm)) = full
        .entry(TestKind::FireworksStorm)
        .and_then(|e| e.result.as_deref())
    else {
        panic!("fireworks storm result missing");
    };
    let expected: u32 = expected_requests(&short_load_profile(50)).iter().map(|(_, n)| n).sum();
    assert_eq!(storm.report.requests_sent, u64::from(expected));

    assert!(full.all_passed, "{}", full.generate_text());
    assert!((full.success_rate - 1.0).abs() < f64::EPSILON);
    assert!(orch.registry().versions().is_empty());
}

#[tokio::test]
async fn test_full_validation_records_invalid_params_per_entry() {
    let orch = orchestrator();
    let params = FullValidationParams {
        massive_query: MassiveQueryParams {
            concurrent_queries: usize::MAX,
            ..small_massive_query()
        },
        cold_start_validation: ColdStartParams {
            corpus_size: 3,
            ..ColdStartParams::default()
        },
        fireworks_storm: FireworksParams {
            payload_bytes: 1 << 40,
            ..quick_fireworks(50)
        },
        immutability_versioning: VersioningParams {
            size_mb: 1 << 44,
            ..small_versioning()
        },
    };
    let full = orch.full_validation(&params, &CancelToken::new()).await;
    assert_eq!(full.tests_total, 4);
    assert_eq!(full.tests_passed, 0);
    for entry in &full.tests {
        let error = entry.error.as_deref().unwrap_or_default();
        assert!(error.starts_with("invalid parameters"), "{:?}: {error}", entry.test_type);
    }
}

#[tokio::test]
async fn test_full_validation_after_cancel_records_every_entry() {
    let orch = orchestrator();
    let cancel = CancelToken::new();
    cancel.cancel();
    let full = orch.full_validation(&FullValidationParams::default(), &cancel).await;
    assert_eq!(full.tests_total, 4);
    assert_eq!(full.tests_passed, 0);
    assert!(!full.all_passed);
    for entry in &full.tests {
        assert!(!entry.passed);
        assert_eq!(entry.error.as_deref(), Some("operation cancelled"));
    }
}

#[tokio::test]
async fn test_submitted_job_completes() {
    let orch = orchestrator();
    let body = serde_json::json!({ "size_mb": 1 });
    let id = orch.submit_test(TestKind::ImmutabilityVersioning, body).unwrap();

    let report = orch.wait_job(id).await.unwrap();
    assert_eq!(report.test_id, id);
    assert_eq!(report.status, JobStatus::Completed);
    assert_eq!(report.passed, Some(true));
    assert!(report.generate_text().contains("=== Immutability Versioning ==="));

    let listed = orch.list_jobs();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0], report);
}

#[tokio::test]
async fn test_bad_params_create_no_job() {
    let orch = orchestrator();
    let err = orch
        .submit_test(TestKind::MassiveQuery, serde_json::json!({ "concurrent_queries": 0 }))
        .unwrap_err();
    assert!(matches!(err, FlareError::InvalidParams(_)));
    assert!(orch.list_jobs().is_empty());
}

#[tokio::test]
async fn test_unknown_job_ids() {
    let orch = orchestrator();
    let id = JobId::new();
    assert!(orch.get_job(id).is_none());
    assert!(matches!(orch.cancel_job(id), Err(FlareError::JobNotFound(_))));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_storm_keeps_partial_report() {
    let orch = orchestrator();
    let body = serde_json::json!({ "target_rps": 20, "ramp_seconds": 1, "sustain_seconds": 120 });
    let id = orch.submit_test(TestKind::FireworksStorm, body).unwrap();

    tokio::time::sleep(Duration::from_secs(3)).await;
    orch.cancel_job(id).unwrap();
    let report = orch.wait_job(id).await.unwrap();

    assert_eq!(report.status, JobStatus::Cancelled);
    assert_eq!(report.passed, Some(false));
    let Some(ScenarioResult::FireworksStorm(storm)) = report.result else {
        panic!("expected a partial storm result");
    };
    assert!(storm.report.cancelled);
    assert!(storm.report.requests_sent < 20 * 120);
}

#[tokio::test(start_paused = true)]
async fn test_job_deadline_fails_long_storm() {
    let config = FlareConfig {
        job_timeout_secs: 2,
        ..test_config()
    };
    let orch = Arc::new(ValidationOrchestrator::new(config).unwrap());
    let body = serde_json::json!({ "target_rps": 10, "ramp_seconds": 1, "sustain_seconds": 60 });
    let id = orch.submit_test(TestKind::FireworksStorm, body).unwrap();

    let report = orch.wait_job(id).await.unwrap();
    assert_eq!(report.status, JobStatus::Failed);
    assert!(report.error.unwrap().contains("timed out after 2s"));
}
