use std::sync::Arc;

use clautero_core::Workflow;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub workflow: Arc<Workflow>,
}
