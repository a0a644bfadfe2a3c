//! `GET /health` (§6): liveness only, no dependency checks.

use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_seconds: i64,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime_seconds = (chrono::Utc::now() - state.started_at).num_seconds().max(0);
    Json(HealthResponse { status: "ok", uptime_seconds })
}
