//! Adapter for any backend that speaks the OpenAI `/chat/completions`
//! wire format (used directly for OpenAI-like backends, and as the base
//! for OpenRouter/Groq/Azure-style proxies that only vary in base URL
//! and auth header).

use crate::auth::CredentialSource;
use async_trait::async_trait;
use helix_core::{
    AdapterResponse, ChatRequest, FinishReason, HelixError, ProviderId, Result, Usage,
};
use helix_core::provider::{Capability, ProviderAdapter};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [helix_core::ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireMessage {
    content: String,
}

#[derive(Deserialize, Default)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

/// One OpenAI-compatible backend reachable over `reqwest`.
///
/// `model` overrides the logical model name from [`ChatRequest`] when the
/// backend expects a specific deployment/model id (e.g. an Azure
/// deployment name); leave empty to pass the request's model through.
pub struct OpenAiCompatibleAdapter {
    id: ProviderId,
    capabilities: BTreeSet<Capability>,
    http: reqwest::Client,
    base_url: String,
    model_override: Option<String>,
    auth: CredentialSource,
}

impl OpenAiCompatibleAdapter {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>, auth: CredentialSource) -> Self {
        Self {
            id: ProviderId::new(id),
            capabilities: [Capability::Streaming, Capability::JsonMode].into_iter().collect(),
            http: reqwest::Client::builder().build().expect("reqwest client build"),
            base_url: base_url.into(),
            model_override: None,
            auth,
        }
    }

    pub fn with_capabilities(mut self, caps: impl IntoIterator<Item = Capability>) -> Self {
        self.capabilities = caps.into_iter().collect();
        self
    }

    pub fn with_model_override(mut self, model: impl Into<String>) -> Self {
        self.model_override = Some(model.into());
        self
    }
}

fn map_finish_reason(raw: Option<&str>) -> FinishReason {
    match raw {
        Some("stop") => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        Some("tool_calls") | Some("function_call") => FinishReason::ToolCalls,
        _ => FinishReason::Other,
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatibleAdapter {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    fn capabilities(&self) -> &BTreeSet<Capability> {
        &self.capabilities
    }

    #[tracing::instrument(skip(self, request), fields(provider = %self.id))]
    async fn complete(&self, request: &ChatRequest, deadline: Duration) -> Result<AdapterResponse> {
        let bearer = self.auth.resolve().await?;
        let model = self.model_override.as_deref().unwrap_or(&request.model);
        let wire = WireRequest {
            model,
            messages: &request.messages,
            temperature: request.temperature,
            top_p: request.top_p,
            max_tokens: request.max_tokens,
        };

        let mut req = self.http.post(format!("{}/chat/completions", self.base_url)).json(&wire);
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }

        let resp = tokio::time::timeout(deadline, req.send())
            .await
            .map_err(|_| HelixError::TransientBackend(format!("{} timed out after {deadline:?}", self.id)))?
            .map_err(|e| HelixError::TransientBackend(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(HelixError::Throttled(format!("{} returned 429", self.id)));
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(HelixError::Unauthorised(format!("{} returned {}", self.id, status)));
        }
        if status.is_server_error() {
            return Err(HelixError::TransientBackend(format!("{} returned {}", self.id, status)));
        }
        if !status.is_success() {
            return Err(HelixError::SchemaMismatch(format!("{} returned {}", self.id, status)));
        }

        let body: WireResponse = resp.json().await.map_err(|e| HelixError::SchemaMismatch(e.to_string()))?;
        let choice = body.choices.into_iter().next().ok_or_else(|| {
            HelixError::SchemaMismatch(format!("{} returned no choices", self.id))
        })?;
        let usage = body.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }).unwrap_or_default();

        Ok(AdapterResponse {
            content: choice.message.content,
            usage,
            confidence: None,
            finish_reason: map_finish_reason(choice.finish_reason.as_deref()),
        })
    }
}
