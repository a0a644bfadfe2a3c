//! Adapter for Anthropic-style backends: `/v1/messages`, a split system
//! prompt, and an `x-api-key`/`anthropic-version` header pair instead of
//! a plain bearer token.

use crate::auth::CredentialSource;
use async_trait::async_trait;
use helix_core::{AdapterResponse, ChatRequest, FinishReason, HelixError, ProviderId, Result, Usage};
use helix_core::provider::{Capability, ProviderAdapter};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct WireResponse {
    content: Vec<WireBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireBlock {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize, Default)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

/// An Anthropic-compatible backend reachable over `reqwest`.
pub struct AnthropicBearerAdapter {
    id: ProviderId,
    capabilities: BTreeSet<Capability>,
    http: reqwest::Client,
    base_url: String,
    default_max_tokens: u32,
    auth: CredentialSource,
}

impl AnthropicBearerAdapter {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>, auth: CredentialSource) -> Self {
        Self {
            id: ProviderId::new(id),
            capabilities: [Capability::Reasoning, Capability::FunctionCalling].into_iter().collect(),
            http: reqwest::Client::builder().build().expect("reqwest client build"),
            base_url: base_url.into(),
            default_max_tokens: 4096,
            auth,
        }
    }

    pub fn with_capabilities(mut self, caps: impl IntoIterator<Item = Capability>) -> Self {
        self.capabilities = caps.into_iter().collect();
        self
    }

    pub fn with_default_max_tokens(mut self, max_tokens: u32) -> Self {
        self.default_max_tokens = max_tokens;
        self
    }
}

fn map_stop_reason(raw: Option<&str>) -> FinishReason {
    match raw {
        Some("end_turn") | Some("stop_sequence") => FinishReason::Stop,
        Some("max_tokens") => FinishReason::Length,
        Some("tool_use") => FinishReason::ToolCalls,
        _ => FinishReason::Other,
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicBearerAdapter {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    fn capabilities(&self) -> &BTreeSet<Capability> {
        &self.capabilities
    }

    #[tracing::instrument(skip(self, request), fields(provider = %self.id))]
    async fn complete(&self, request: &ChatRequest, deadline: Duration) -> Result<AdapterResponse> {
        let key = self.auth.resolve().await?;

        let system = request.messages.iter().find(|m| m.role == "system").map(|m| m.content.as_str());
        let messages: Vec<WireMessage> = request
            .messages
            .iter()
            .filter(|m| m.role != "system")
            .map(|m| WireMessage { role: &m.role, content: &m.content })
            .collect();

        let wire = WireRequest {
            model: &request.model,
            messages,
            system,
            max_tokens: request.max_tokens.unwrap_or(self.default_max_tokens),
            temperature: request.temperature,
        };

        let mut req = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&wire);
        if let Some(key) = key {
            req = req.header("x-api-key", key);
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
        let content = body.content.into_iter().map(|b| b.text).collect::<Vec<_>>().join("");
        let usage = body.usage.map(|u| Usage {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
            total_tokens: u.input_tokens + u.output_tokens,
        }).unwrap_or_default();

        Ok(AdapterResponse {
            content,
            usage,
            confidence: None,
            finish_reason: map_stop_reason(body.stop_reason.as_deref()),
        })
    }
}
