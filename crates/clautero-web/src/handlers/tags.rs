use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::state::AppState;

/// Run the tag backfill inline. Failures are reported in the body with a
/// 200 status so cron-style callers only need to read one field.
pub async fn add_missing_tags(State(state): State<Arc<AppState>>) -> Json<Value> {
    match state.workflow.run_tag_backfill().await {
        Ok(report) => {
            tracing::info!(tagged = report.tagged.len(), "tag backfill finished");
            Json(json!({ "status": "Tags added successfully!" }))
        }
        Err(e) => {
            tracing::error!(error = %e, "tag backfill failed");
            Json(json!({ "status": "Error", "message": e.to_string() }))
        }
    }
}
