//! Builds every [`ProviderAdapter`] the process knows how to construct
//! from ambient configuration (§6: "provider API keys by conventional
//! name"), wraps each in [`GuardedAdapter`], and registers it.

use helix_auth::CredentialStore;
use helix_core::provider::{Capability, ProviderAdapter};
use helix_core::{AuthMode, ProviderDescriptor, ProviderFamily};
use helix_limiter::{GuardedAdapter, LimiterRegistry};
use helix_provider::{AnthropicBearerAdapter, CredentialSource, OpenAiCompatibleAdapter};
use helix_registry::Registry;
use helix_telemetry::MetricsRegistry;
use std::sync::Arc;

/// One statically known OpenAI-wire-compatible backend, keyed by the
/// conventional env var carrying its API key.
struct OpenAiLikeSpec {
    id: &'static str,
    env_key: &'static str,
    env_base_url: &'static str,
    default_base_url: &'static str,
    capabilities: &'static [Capability],
}

const OPENAI_LIKE: &[OpenAiLikeSpec] = &[
    OpenAiLikeSpec {
        id: "openai",
        env_key: "OPENAI_API_KEY",
        env_base_url: "OPENAI_BASE_URL",
        default_base_url: "https://api.openai.com/v1",
        capabilities: &[Capability::Streaming, Capability::JsonMode, Capability::FunctionCalling],
    },
    OpenAiLikeSpec {
        id: "openrouter",
        env_key: "OPENROUTER_API_KEY",
        env_base_url: "OPENROUTER_BASE_URL",
        default_base_url: "https://openrouter.ai/api/v1",
        capabilities: &[Capability::Streaming, Capability::JsonMode],
    },
    OpenAiLikeSpec {
        id: "groq",
        env_key: "GROQ_API_KEY",
        env_base_url: "GROQ_BASE_URL",
        default_base_url: "https://api.groq.com/openai/v1",
        capabilities: &[Capability::Streaming],
    },
];

/// Registers every provider discoverable from the environment: static
/// API-key backends per [`OPENAI_LIKE`] and `ANTHROPIC_API_KEY`, plus the
/// two OAuth-backed CLI-tool passthroughs when their `*_USE_OAUTH_CREDENTIALS`
/// flag is set (§4.A). Returns the count registered, purely for the
/// startup log line.
pub async fn register_all(
    registry: &Registry,
    limiter: &LimiterRegistry,
    credentials: &Arc<CredentialStore>,
    metrics: &MetricsRegistry,
) -> usize {
    let mut count = 0;

    for spec in OPENAI_LIKE {
        let Ok(key) = std::env::var(spec.env_key) else { continue };
        let base_url = std::env::var(spec.env_base_url).unwrap_or_else(|_| spec.default_base_url.to_string());
        let auth = CredentialSource::ApiKey(key);
        let adapter = OpenAiCompatibleAdapter::new(spec.id, base_url.clone(), auth).with_capabilities(spec.capabilities.iter().copied());
        register(registry, limiter, metrics, Arc::new(adapter), spec.id, ProviderFamily::OpenaiLike, AuthMode::ApiKey, base_url, spec.capabilities).await;
        count += 1;
    }

    if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
        let base_url = std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| "https://api.anthropic.com".to_string());
        let auth = CredentialSource::ApiKey(key);
        let caps = [Capability::Reasoning, Capability::FunctionCalling];
        let adapter = AnthropicBearerAdapter::new("anthropic", base_url.clone(), auth).with_capabilities(caps);
        register(registry, limiter, metrics, Arc::new(adapter), "anthropic", ProviderFamily::Anthropic, AuthMode::ApiKey, base_url, &caps).await;
        count += 1;
    }

    if credentials.enabled("claude-code") {
        let base_url = "https://api.anthropic.com".to_string();
        let auth = CredentialSource::Oauth { store: credentials.clone(), tool: "claude-code".to_string() };
        let caps = [Capability::Reasoning, Capability::FunctionCalling];
        let adapter = AnthropicBearerAdapter::new("claude-code", base_url.clone(), auth).with_capabilities(caps);
        register(registry, limiter, metrics, Arc::new(adapter), "claude-code", ProviderFamily::Anthropic, AuthMode::Oauth, base_url, &caps).await;
        count += 1;
    }

    if credentials.enabled("qwen-code") {
        let base_url = "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string();
        let auth = CredentialSource::Oauth { store: credentials.clone(), tool: "qwen-code".to_string() };
        let caps = [Capability::Streaming];
        let adapter = OpenAiCompatibleAdapter::new("qwen-code", base_url.clone(), auth).with_capabilities(caps);
        register(registry, limiter, metrics, Arc::new(adapter), "qwen-code", ProviderFamily::OpenaiLike, AuthMode::Oauth, base_url, &caps).await;
        count += 1;
    }

    count
}

async fn register(
    registry: &Registry,
    limiter: &LimiterRegistry,
    metrics: &MetricsRegistry,
    inner: Arc<dyn ProviderAdapter>,
    id: &str,
    family: ProviderFamily,
    auth_mode: AuthMode,
    base_url: String,
    capabilities: &[Capability],
) {
    let guarded = Arc::new(GuardedAdapter::new(inner, limiter.clone(), metrics.clone()));
    let descriptor = ProviderDescriptor::new(id, id, family, auth_mode, base_url).with_capabilities(capabilities.iter().copied());
    registry.register(guarded, descriptor).await;
}
