use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};

use crate::history::{CycleHistory, CycleSummary};

#[derive(Clone)]
pub struct AppState {
    pub history: Arc<CycleHistory>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/status", get(status))
        .route("/status/recent", get(recent))
        .with_state(state)
}

async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "last_cycle": state.history.last() }))
}

async fn recent(State(state): State<AppState>) -> Json<Vec<CycleSummary>> {
    Json(state.history.snapshot_last_n(20))
}
