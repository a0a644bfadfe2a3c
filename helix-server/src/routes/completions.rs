//! `POST /v1/completions` (§6): the legacy single-prompt text completion
//! surface, translated into one ensemble chat turn.

use crate::error::ApiError;
use crate::state::AppState;
use crate::wire::{LegacyCompletionChoice, LegacyCompletionRequest, LegacyCompletionResponse};
use axum::extract::State;
use axum::Json;
use helix_core::chat::{ChatMessage, FinishReason};
use helix_core::{ChatRequest, HelixError};
use helix_ensemble::EnsembleConfig;
use tokio::sync::watch;
use uuid::Uuid;

pub async fn legacy_completions(
    State(state): State<AppState>,
    Json(body): Json<LegacyCompletionRequest>,
) -> Result<Json<LegacyCompletionResponse>, ApiError> {
    let request = ChatRequest {
        model: body.model.clone(),
        messages: vec![ChatMessage::user(body.prompt)],
        temperature: body.temperature,
        top_p: None,
        max_tokens: body.max_tokens,
        stream: false,
        response_format: None,
        tools: None,
    };
    let config = EnsembleConfig::default();
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let overall_timeout = config.per_call_timeout + std::time::Duration::from_secs(5);

    let response = match tokio::time::timeout(overall_timeout, state.ensemble.complete(&request, &config, cancel_rx)).await {
        Ok(result) => result?,
        Err(_) => return Err(ApiError::from(HelixError::Cancelled)),
    };

    Ok(Json(LegacyCompletionResponse {
        id: format!("cmpl-{}", Uuid::new_v4()),
        object: "text_completion",
        created: chrono::Utc::now().timestamp(),
        model: body.model,
        choices: vec![LegacyCompletionChoice { index: 0, text: response.content, finish_reason: FinishReason::Stop }],
        usage: response.usage,
    }))
}
