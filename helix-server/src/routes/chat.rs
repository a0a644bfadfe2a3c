//! `POST /v1/chat/completions` (§6): non-streaming and SSE-streaming chat
//! completions through the Ensemble Engine.

use crate::error::ApiError;
use crate::state::AppState;
use crate::wire::{
    ChatCompletionChoice, ChatCompletionChunk, ChatCompletionChunkChoice, ChatCompletionChunkDelta,
    ChatCompletionMessage, ChatCompletionResponse,
};
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use helix_core::chat::{EnsembleResponse, FinishReason};
use helix_core::{ChatRequest, HelixError};
use helix_ensemble::{EnsembleConfig, Strategy};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

/// `ensemble:<strategy>` lets a caller pick an aggregation strategy
/// through the standard `model` field rather than inventing non-OpenAI
/// request fields; any other model name runs with the default strategy.
fn config_for_model(model: &str) -> EnsembleConfig {
    let strategy = match model.strip_prefix("ensemble:") {
        Some("confidence-weighted") => Strategy::ConfidenceWeighted,
        Some("consensus") => Strategy::Consensus,
        _ => Strategy::Majority,
    };
    EnsembleConfig { strategy, ..Default::default() }
}

pub async fn chat_completions(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    if request.stream {
        return Ok(stream_chat_completion(state, request).await.into_response());
    }

    let config = config_for_model(&request.model);
    let response = run_with_deadline(&state, &request, &config).await?;
    Ok(Json(to_wire_response(&request.model, response)).into_response())
}

/// Races the ensemble call against an overall deadline; on timeout the
/// same cancel channel the call is awaiting aborts its outstanding
/// attempts (§5's ≤1 s abort bound), rather than just walking away and
/// leaving them running.
async fn run_with_deadline(
    state: &AppState,
    request: &ChatRequest,
    config: &EnsembleConfig,
) -> Result<EnsembleResponse, ApiError> {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let overall_timeout = config.per_call_timeout + Duration::from_secs(5);
    match tokio::time::timeout(overall_timeout, state.ensemble.complete(request, config, cancel_rx)).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(_) => {
            let _ = cancel_tx.send(true);
            Err(ApiError::from(HelixError::Cancelled))
        }
    }
}

fn to_wire_response(model: &str, response: EnsembleResponse) -> ChatCompletionResponse {
    ChatCompletionResponse {
        id: format!("chatcmpl-{}", Uuid::new_v4()),
        object: "chat.completion",
        created: chrono::Utc::now().timestamp(),
        model: model.to_string(),
        choices: vec![ChatCompletionChoice {
            index: 0,
            message: ChatCompletionMessage { role: "assistant", content: response.content },
            finish_reason: FinishReason::Stop,
        }],
        usage: response.usage,
        helix_attempts: response.attempts,
    }
}

/// Backends exposed through [`helix_core::provider::ProviderAdapter`] only
/// implement whole-response `complete`, not token-level streaming (no
/// adapter in this workspace implements [`helix_core::StreamChunk`]
/// production). SSE mode runs the same ensemble call to completion, then
/// re-chunks the winning content into deltas so `stream=true` clients get
/// the OpenAI-compatible event shape they expect.
async fn stream_chat_completion(state: AppState, request: ChatRequest) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let config = config_for_model(&request.model);
    let id = format!("chatcmpl-{}", Uuid::new_v4());
    let model = request.model.clone();
    let created = chrono::Utc::now().timestamp();

    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let outcome = state.ensemble.complete(&request, &config, cancel_rx).await;

    let mut events = Vec::new();
    match outcome {
        Ok(response) => {
            const CHUNK_CHARS: usize = 24;
            let chars: Vec<char> = response.content.chars().collect();
            let mut index = 0;
            for piece in chars.chunks(CHUNK_CHARS) {
                let chunk = ChatCompletionChunk {
                    id: id.clone(),
                    object: "chat.completion.chunk",
                    created,
                    model: model.clone(),
                    choices: vec![ChatCompletionChunkChoice {
                        index: 0,
                        delta: ChatCompletionChunkDelta {
                            role: if index == 0 { Some("assistant") } else { None },
                            content: Some(piece.iter().collect()),
                        },
                        finish_reason: None,
                    }],
                };
                events.push(Event::default().json_data(chunk).expect("chunk always serialises"));
                index += 1;
            }
            let closing = ChatCompletionChunk {
                id,
                object: "chat.completion.chunk",
                created,
                model,
                choices: vec![ChatCompletionChunkChoice {
                    index: 0,
                    delta: ChatCompletionChunkDelta { role: None, content: None },
                    finish_reason: Some(FinishReason::Stop),
                }],
            };
            events.push(Event::default().json_data(closing).expect("chunk always serialises"));
            events.push(Event::default().data("[DONE]"));
        }
        Err(error) => {
            events.push(Event::default().event("error").data(error.to_string()));
        }
    }

    Sse::new(futures::stream::iter(events.into_iter().map(Ok))).keep_alive(KeepAlive::default())
}
