//! Per-provider admission control combining the token bucket and circuit
//! breaker, and a [`ProviderAdapter`] decorator that applies it (§4.H).

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::token_bucket::{TokenBucket, TokenBucketConfig};
use async_trait::async_trait;
use helix_core::provider::{Capability, ProviderAdapter};
use helix_core::{AdapterResponse, ChatRequest, HelixError, Outcome, ProviderId, Result};
use helix_telemetry::{Component, EventOutcome, MetricsRegistry, ObservabilityEvent};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

struct Guard {
    bucket: Mutex<TokenBucket>,
    breaker: Mutex<CircuitBreaker>,
}

/// Owns one [`Guard`] per provider id, created lazily on first use.
#[derive(Clone, Default)]
pub struct LimiterRegistry {
    guards: Arc<Mutex<HashMap<ProviderId, Arc<Guard>>>>,
}

impl LimiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    async fn guard_for(&self, id: &ProviderId) -> Arc<Guard> {
        let mut guards = self.guards.lock().await;
        guards
            .entry(id.clone())
            .or_insert_with(|| {
                Arc::new(Guard {
                    bucket: Mutex::new(TokenBucket::new(TokenBucketConfig::default())),
                    breaker: Mutex::new(CircuitBreaker::new(CircuitBreakerConfig::default())),
                })
            })
            .clone()
    }

    pub async fn admit(&self, id: &ProviderId) -> Result<()> {
        let guard = self.guard_for(id).await;
        if !guard.breaker.lock().await.allow() {
            return Err(HelixError::Throttled(format!("{id} circuit open")));
        }
        if !guard.bucket.lock().await.try_acquire() {
            return Err(HelixError::Throttled(format!("{id} rate limit exceeded")));
        }
        Ok(())
    }

    pub async fn record_outcome(&self, id: &ProviderId, outcome: Outcome) {
        let guard = self.guard_for(id).await;
        let mut breaker = guard.breaker.lock().await;
        match outcome {
            Outcome::Success => breaker.on_success(),
            Outcome::AuthFailure | Outcome::OtherFailure => breaker.on_failure(),
        }
    }
}

/// Wraps one [`ProviderAdapter`] so every call passes through admission
/// control first. Adapters themselves never retry or rate-limit (§4.B) —
/// this is the single place that owns that concern.
pub struct GuardedAdapter {
    inner: Arc<dyn ProviderAdapter>,
    limiter: LimiterRegistry,
    metrics: MetricsRegistry,
}

impl GuardedAdapter {
    pub fn new(inner: Arc<dyn ProviderAdapter>, limiter: LimiterRegistry, metrics: MetricsRegistry) -> Self {
        Self { inner, limiter, metrics }
    }
}

#[async_trait]
impl ProviderAdapter for GuardedAdapter {
    fn id(&self) -> &ProviderId {
        self.inner.id()
    }

    fn capabilities(&self) -> &BTreeSet<Capability> {
        self.inner.capabilities()
    }

    async fn complete(&self, request: &ChatRequest, deadline: Duration) -> Result<AdapterResponse> {
        let id = self.inner.id().clone();
        self.limiter.admit(&id).await?;

        let started = std::time::Instant::now();
        let result = self.inner.complete(request, deadline).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        // A `Throttled` result — whether from the limiter's own `admit` or
        // returned by the wrapped adapter itself (e.g. an upstream 429) —
        // never counts against the breaker (§5): it's retryable and not a
        // provider failure.
        let outcome = match &result {
            Ok(_) => Some(Outcome::Success),
            Err(HelixError::Unauthorised(_)) => Some(Outcome::AuthFailure),
            Err(HelixError::Throttled(_)) => None,
            Err(_) => Some(Outcome::OtherFailure),
        };
        if let Some(outcome) = outcome {
            self.limiter.record_outcome(&id, outcome).await;
        }
        self.metrics.observe_millis("provider.adapter.latency_ms", latency_ms);

        if let Err(e) = &result {
            helix_telemetry::emit(
                ObservabilityEvent::new(Component::Limiter, EventOutcome::Failure, latency_ms)
                    .with_provider(id.to_string())
                    .with_detail(e.to_string()),
            );
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ThrottledAdapter {
        id: ProviderId,
        capabilities: BTreeSet<Capability>,
    }

    #[async_trait]
    impl ProviderAdapter for ThrottledAdapter {
        fn id(&self) -> &ProviderId {
            &self.id
        }
        fn capabilities(&self) -> &BTreeSet<Capability> {
            &self.capabilities
        }
        async fn complete(&self, _request: &ChatRequest, _deadline: Duration) -> Result<AdapterResponse> {
            Err(HelixError::Throttled(format!("{} returned 429", self.id)))
        }
    }

    fn request() -> ChatRequest {
        use helix_core::chat::ChatMessage;
        ChatRequest {
            model: "test".into(),
            messages: vec![ChatMessage::user("hi")],
            temperature: None,
            top_p: None,
            max_tokens: None,
            stream: false,
            response_format: None,
            tools: None,
        }
    }

    #[tokio::test]
    async fn adapter_throttled_does_not_trip_breaker() {
        let id = ProviderId::new("flaky");
        let limiter = LimiterRegistry::new();
        let adapter = GuardedAdapter::new(
            Arc::new(ThrottledAdapter { id: id.clone(), capabilities: BTreeSet::new() }),
            limiter.clone(),
            MetricsRegistry::new(),
        );

        // More than the breaker's default failure_threshold (5), but
        // within the token bucket's default capacity (10) so admission
        // itself keeps succeeding.
        for _ in 0..6 {
            let result = adapter.complete(&request(), Duration::from_secs(1)).await;
            assert!(matches!(result, Err(HelixError::Throttled(_))));
        }

        assert!(limiter.admit(&id).await.is_ok(), "circuit breaker must stay closed on adapter-level Throttled");
    }
}
