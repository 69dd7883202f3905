use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::state::AppState;

/// Start a summarization pass in the background and return immediately.
///
/// Passes are not coordinated: two requests in quick succession run two
/// passes side by side.
pub async fn summarize(State(state): State<Arc<AppState>>) -> Json<Value> {
    let workflow = Arc::clone(&state.workflow);
    tokio::spawn(async move {
        match workflow.run_summarization_pass().await {
            Ok(report) => tracing::info!(%report, "background summarization finished"),
            Err(e) => tracing::error!(error = %e, "background summarization aborted"),
        }
    });
    Json(json!({ "status": "started summary" }))
}
