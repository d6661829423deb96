//! Health check endpoint.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let orchestrator = &state.orchestrator;
    Json(json!({
        "status": "ok",
        "repositories": orchestrator.repositories().len(),
        "providers": orchestrator.providers().source_names(),
    }))
}
