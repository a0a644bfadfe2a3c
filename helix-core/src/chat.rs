//! OpenAI-compatible chat/completion wire types.
//!
//! These are the neutral request/response shapes every [`crate::provider::ProviderAdapter`]
//! translates to and from. Kept deliberately close to the public OpenAI schema
//! since `helix-server` re-exposes it verbatim at `/v1/chat/completions`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into(), name: None }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into(), name: None }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".into(), content: content.into(), name: None }
    }
}

/// A neutral chat request handed to a [`crate::provider::ProviderAdapter`].
///
/// `model` names the logical/virtual model (e.g. `"ensemble"`); adapters
/// substitute their own backend model id when translating to wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub response_format: Option<ResponseFormat>,
    #[serde(default)]
    pub tools: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    Text,
    JsonObject,
}

/// Token accounting returned alongside a completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// What one adapter call produced, translated back to the neutral shape.
///
/// `confidence` is the backend's self-reported confidence when it offers
/// one (not all backends do); the ensemble engine treats a missing value
/// as `0.5` for the `confidence-weighted` strategy so every candidate
/// still contributes to its group's sum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterResponse {
    pub content: String,
    pub usage: Usage,
    pub confidence: Option<f32>,
    pub finish_reason: FinishReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
    Other,
}

/// A single delta chunk of a streamed completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub delta: String,
    pub finish_reason: Option<FinishReason>,
}

/// What the caller ultimately receives from the ensemble engine: the
/// winning content plus the full dispatch ledger required by §4.G's
/// ordering guarantee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleResponse {
    pub content: String,
    pub usage: Usage,
    pub attempts: Vec<AttemptRecord>,
    pub strategy_used: String,
}

/// One (provider, latency, outcome) tuple in dispatch-initiation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub position: usize,
    pub provider_id: String,
    pub latency_ms: u64,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum AttemptOutcome {
    Success { confidence: Option<f32> },
    Failed { error_code: String },
}
