use axum::Json;
use serde_json::{Value, json};

pub async fn ping() -> Json<Value> {
    tracing::info!("ping");
    Json(json!({ "status": "Server is up and running!" }))
}
