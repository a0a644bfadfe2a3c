//! No-network adapter used by tests and local demos, mirroring how the
//! teacher repo ships an offline-friendly local model client.

use async_trait::async_trait;
use helix_core::{AdapterResponse, ChatRequest, FinishReason, HelixError, ProviderId, Result, Usage};
use helix_core::provider::{Capability, ProviderAdapter};
use std::collections::BTreeSet;
use std::time::Duration;

/// Echoes the last user message back as the completion. Optionally
/// simulates latency and a fixed failure mode for fallback-chain tests.
pub struct EchoAdapter {
    id: ProviderId,
    capabilities: BTreeSet<Capability>,
    latency: Duration,
    fail_with: Option<HelixError>,
}

impl EchoAdapter {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: ProviderId::new(id),
            capabilities: [Capability::Streaming].into_iter().collect(),
            latency: Duration::ZERO,
            fail_with: None,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn always_failing_with(mut self, error: HelixError) -> Self {
        self.fail_with = Some(error);
        self
    }
}

#[async_trait]
impl ProviderAdapter for EchoAdapter {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    fn capabilities(&self) -> &BTreeSet<Capability> {
        &self.capabilities
    }

    async fn complete(&self, request: &ChatRequest, deadline: Duration) -> Result<AdapterResponse> {
        if self.latency > Duration::ZERO {
            if tokio::time::timeout(deadline, tokio::time::sleep(self.latency)).await.is_err() {
                return Err(HelixError::TransientBackend(format!("{} timed out after {deadline:?}", self.id)));
            }
        }
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }

        let content = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.clone())
            .unwrap_or_default();

        Ok(AdapterResponse {
            content,
            usage: Usage { prompt_tokens: 1, completion_tokens: 1, total_tokens: 2 },
            confidence: Some(1.0),
            finish_reason: FinishReason::Stop,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_last_user_message() {
        let adapter = EchoAdapter::new("echo-1");
        let req = ChatRequest {
            model: "ensemble".into(),
            messages: vec![helix_core::ChatMessage::system("sys"), helix_core::ChatMessage::user("hello")],
            temperature: None,
            top_p: None,
            max_tokens: None,
            stream: false,
            response_format: None,
            tools: None,
        };
        let resp = adapter.complete(&req, Duration::from_secs(1)).await.unwrap();
        assert_eq!(resp.content, "hello");
    }

    #[tokio::test]
    async fn always_failing_adapter_returns_configured_error() {
        let adapter = EchoAdapter::new("echo-2").always_failing_with(HelixError::TransientBackend("boom".into()));
        let req = ChatRequest {
            model: "ensemble".into(),
            messages: vec![helix_core::ChatMessage::user("hi")],
            temperature: None,
            top_p: None,
            max_tokens: None,
            stream: false,
            response_format: None,
            tools: None,
        };
        let err = adapter.complete(&req, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, HelixError::TransientBackend(_)));
    }
}
