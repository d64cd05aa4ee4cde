//! HTTP job API
//!
//! Endpoints:
//! - POST   /tests/{name}  - start a scenario as a job, 202 with its id
//! - GET    /tests/{id}    - job snapshot
//! - DELETE /tests/{id}    - request cancellation
//! - GET    /tests         - job summaries
//! - GET    /health        - component status
//!
//! All responses use Content-Type: application/json.

mod handlers;
mod state;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use flare_core::{ErrorKind, FlareError, ValidationOrchestrator};
use tracing::info;

use self::handlers::{
    handle_cancel_test, handle_get_test, handle_health, handle_list_tests, handle_not_found,
    handle_submit_test,
};
use self::state::AppState;

/// Scenario bodies may carry source corpora; 10 MB.
const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// JSON error body with the given status
fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Throttling => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::ComputeFailure | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Error response carrying the taxonomy bucket
fn error_response(err: &FlareError) -> Response {
    let kind = err.kind();
    let body = serde_json::json!({ "error": err.to_string(), "kind": kind.as_str() });
    (status_for(kind), Json(body)).into_response()
}

/// Routes over one orchestrator
pub fn router(orchestrator: Arc<ValidationOrchestrator>) -> Router {
    let state = Arc::new(AppState::new(orchestrator));
    Router::new()
        .route("/health", get(handle_health))
        .route("/tests", get(handle_list_tests))
        .route(
            "/tests/{key}",
            get(handle_get_test)
                .post(handle_submit_test)
                .delete(handle_cancel_test),
        )
        .fallback(handle_not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Bind `addr` and serve until `shutdown` resolves
///
/// # Errors
/// Returns the bind or accept error
pub async fn serve(
    orchestrator: Arc<ValidationOrchestrator>,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "flare listening");
    axum::serve(listener, router(orchestrator))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("server shut down");
    Ok(())
}
