//! HTTP job API against a server on an ephemeral port.

use std::sync::Arc;
use std::time::Duration;

use flare_core::{FlareConfig, ValidationOrchestrator};
use flare_test_utils::{instant_query_config, small_store_config};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

/// Start a server on 127.0.0.1:0 and return its base URL
async fn start_server() -> String {
    let config = FlareConfig {
        store: small_store_config(),
        query: instant_query_config(),
        ..FlareConfig::default()
    };
    let orchestrator = Arc::new(ValidationOrchestrator::new(config).unwrap());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, flare_server::router(orchestrator))
            .await
            .unwrap();
    });
    format!("http://{addr}")
}

/// Poll until the job leaves `running`
async fn wait_finished(client: &reqwest::Client, base: &str, id: &str) -> Value {
    for _ in 0..600 {
        let job: Value = client
            .get(format!("{base}/tests/{id}"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if job["status"] != "running" {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("job {id} did not finish");
}

#[tokio::test]
async fn test_health_lists_components() {
    let base = start_server().await;
    let resp = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    for component in [
        "partition_store",
        "version_registry",
        "function_scheduler",
        "cold_start_model",
        "orchestrator",
    ] {
        assert_eq!(body["components"][component], "ready");
    }
}

#[tokio::test]
async fn test_submit_and_poll_versioning_job() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/tests/immutability_versioning"))
        .json(&json!({ "size_mb": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);
    let accepted: Value = resp.json().await.unwrap();
    assert_eq!(accepted["status"], "running");
    let id = accepted["test_id"].as_str().unwrap().to_string();

    let job = wait_finished(&client, &base, &id).await;
    assert_eq!(job["status"], "completed");
    assert_eq!(job["test_type"], "immutability_versioning");
    assert_eq!(job["passed"], true);
    assert_eq!(job["result"]["test_type"], "immutability_versioning");
    assert!(job["finished_at"].is_string());

    let list: Value = client
        .get(format!("{base}/tests"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["tests"].as_array().unwrap().len(), 1);
    assert_eq!(list["tests"][0]["test_id"], id.as_str());
}

#[tokio::test]
async fn test_empty_body_uses_defaults() {
    let base = start_server().await;
    let resp = reqwest::Client::new()
        .post(format!("{base}/tests/immutability_versioning"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);
}

#[tokio::test]
async fn test_unknown_test_name_is_404() {
    let base = start_server().await;
    let resp = reqwest::Client::new()
        .post(format!("{base}/tests/warp_speed"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn test_bad_params_are_400() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/tests/fireworks_storm"))
        .json(&json!({ "target_rps": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{base}/tests/massive_query"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_unknown_job_is_404() {
    let base = start_server().await;
    let client = reqwest::Client::new();
    let missing = flare_core::JobId::new().to_string();

    let resp = client.get(format!("{base}/tests/{missing}")).send().await.unwrap();
    assert_eq!(resp.status(), 404);
    let resp = client.delete(format!("{base}/tests/{missing}")).send().await.unwrap();
    assert_eq!(resp.status(), 404);
    let resp = client.get(format!("{base}/tests/not-an-id")).send().await.unwrap();
    assert_eq!(resp.status(), 404);
    let resp = client.get(format!("{base}/nowhere")).send().await.unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_delete_cancels_running_storm() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    let accepted: Value = client
        .post(format!("{base}/tests/fireworks_storm"))
        .json(&json!({ "target_rps": 5, "ramp_seconds": 1, "sustain_seconds": 300 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = accepted["test_id"].as_str().unwrap().to_string();

    let resp = client.delete(format!("{base}/tests/{id}")).send().await.unwrap();
    assert_eq!(resp.status(), 202);

    let job = wait_finished(&client, &base, &id).await;
    assert_eq!(job["status"], "cancelled");
    assert_eq!(job["passed"], false);
}
