//! Route handlers: health and the test job API

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use flare_core::{JobId, TestKind};

use super::state::AppState;
use super::{error_response, json_error};

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> Response {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health(State(state): State<Arc<AppState>>) -> Response {
    let health = state.orchestrator.health();
    (StatusCode::OK, Json(health)).into_response()
}

/// POST /tests/{name}
pub(crate) async fn handle_submit_test(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    let kind = match name.parse::<TestKind>() {
        Ok(kind) => kind,
        Err(e) => return error_response(&e),
    };
    let params = if body.iter().all(u8::is_ascii_whitespace) {
        serde_json::Value::Null
    } else {
        match serde_json::from_slice(&body) {
            Ok(value) => value,
            Err(e) => {
                return json_error(StatusCode::BAD_REQUEST, &format!("malformed JSON body: {e}"))
            }
        }
    };

    match state.orchestrator.submit_test(kind, params) {
        Ok(id) => {
            let response = serde_json::json!({
                "test_id": id,
                "test_type": kind,
                "status": "running",
            });
            (StatusCode::ACCEPTED, Json(response)).into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// GET /tests/{id}
pub(crate) async fn handle_get_test(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let Ok(id) = id.parse::<JobId>() else {
        return json_error(StatusCode::NOT_FOUND, &format!("job not found: {id}"));
    };
    match state.orchestrator.get_job(id) {
        Some(report) => (StatusCode::OK, Json(report)).into_response(),
        None => json_error(StatusCode::NOT_FOUND, &format!("job not found: {id}")),
    }
}

/// DELETE /tests/{id}
pub(crate) async fn handle_cancel_test(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let Ok(id) = id.parse::<JobId>() else {
        return json_error(StatusCode::NOT_FOUND, &format!("job not found: {id}"));
    };
    match state.orchestrator.cancel_job(id) {
        Ok(()) => {
            let response = serde_json::json!({ "test_id": id, "status": "cancel_requested" });
            (StatusCode::ACCEPTED, Json(response)).into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// GET /tests
pub(crate) async fn handle_list_tests(State(state): State<Arc<AppState>>) -> Response {
    let tests: Vec<serde_json::Value> = state
        .orchestrator
        .list_jobs()
        .into_iter()
        .map(|report| {
            serde_json::json!({
                "test_id": report.test_id,
                "test_type": report.test_type,
                "status": report.status,
                "passed": report.passed,
                "started_at": report.started_at,
                "finished_at": report.finished_at,
            })
        })
        .collect();
    (StatusCode::OK, Json(serde_json::json!({ "tests": tests }))).into_response()
}
