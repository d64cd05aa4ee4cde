//! Shared handler state

use std::sync::Arc;

use flare_core::ValidationOrchestrator;

/// State shared by every handler
#[derive(Debug)]
pub(crate) struct AppState {
    pub(crate) orchestrator: Arc<ValidationOrchestrator>,
}

impl AppState {
    pub(crate) fn new(orchestrator: Arc<ValidationOrchestrator>) -> Self {
        Self { orchestrator }
    }
}
