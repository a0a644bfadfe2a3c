//! OpenAI-shaped request/response bodies for the public HTTP surface.
//! `helix_core::ChatRequest` is accepted directly as the request body
//! since it already mirrors the public schema; these types cover the
//! response shapes and the legacy `/v1/completions` body.

use helix_core::chat::{AttemptRecord, FinishReason, Usage};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct ModelObject {
    pub id: String,
    pub object: &'static str,
    pub owned_by: String,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub object: &'static str,
    pub data: Vec<ModelObject>,
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionChoice {
    pub index: u32,
    pub message: ChatCompletionMessage,
    pub finish_reason: FinishReason,
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatCompletionChoice>,
    pub usage: Usage,
    /// Non-standard field HelixAgent adds to the OpenAI shape: the full
    /// dispatch ledger from §4.G's ordering guarantee.
    pub helix_attempts: Vec<AttemptRecord>,
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionChunkChoice {
    pub index: u32,
    pub delta: ChatCompletionChunkDelta,
    pub finish_reason: Option<FinishReason>,
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatCompletionChunkChoice>,
}

/// Legacy `/v1/completions` body: a single `prompt` string rather than a
/// message array.
#[derive(Debug, Deserialize)]
pub struct LegacyCompletionRequest {
    pub model: String,
    pub prompt: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct LegacyCompletionChoice {
    pub index: u32,
    pub text: String,
    pub finish_reason: FinishReason,
}

#[derive(Debug, Serialize)]
pub struct LegacyCompletionResponse {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<LegacyCompletionChoice>,
    pub usage: Usage,
}
