//! Assembles the axum [`Router`] for the eight §6 routes, with the
//! teacher's tower-http trace/cors/timeout layering.

use crate::routes::{admin, chat, completions, health, models};
use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState, request_timeout: Duration, cors_allow_any_origin: bool) -> Router {
    let cors = if cors_allow_any_origin { CorsLayer::permissive() } else { CorsLayer::new() };
    Router::new()
        .route("/v1/models", get(models::list_models))
        .route("/v1/chat/completions", post(chat::chat_completions))
        .route("/v1/completions", post(completions::legacy_completions))
        .route("/admin/providers", get(admin::list_providers))
        .route("/admin/models/metadata/refresh", post(admin::trigger_refresh))
        .route("/admin/models/metadata/refresh/status", get(admin::refresh_status))
        .route("/health", get(health::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}
