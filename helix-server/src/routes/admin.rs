//! `/admin/*` routes (§6): registry snapshot and verifier/credential
//! refresh history.

use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use helix_core::{ProviderDescriptor, RefreshEvent};
use helix_registry::ProviderFacts;
use serde::Serialize;

pub async fn list_providers(State(state): State<AppState>) -> Json<Vec<ProviderDescriptor>> {
    Json(state.registry.list(&[]).await)
}

/// Triggers a verifier sweep in the background and returns immediately;
/// progress is observed via [`refresh_status`]. `facts_for` has no
/// external metadata mirror wired up yet, so every provider scores with
/// [`ProviderFacts::default`] until one is supplied at the composition
/// root.
pub async fn trigger_refresh(State(state): State<AppState>) -> StatusCode {
    let verifier = state.verifier.clone();
    tokio::spawn(async move {
        verifier.run_once(|_provider_id| ProviderFacts::default()).await;
    });
    StatusCode::ACCEPTED
}

#[derive(Serialize)]
pub struct RefreshStatusResponse {
    pub events: Vec<RefreshEvent>,
}

pub async fn refresh_status(State(state): State<AppState>) -> Json<RefreshStatusResponse> {
    let mut events = state.verifier.history().await;
    events.extend(state.credentials.refresh_history().await);
    events.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    Json(RefreshStatusResponse { events })
}
