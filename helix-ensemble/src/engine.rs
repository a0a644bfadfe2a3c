//! The Ensemble Engine (§4.G): fans a chat request out to `K` independent
//! positions, each driving its own serial fallback chain, then reconciles
//! the surviving answers under one of three strategies.

use crate::plan::{resolve_plan, EnsembleConfig, Strategy};
use crate::strategy::{aggregate_confidence_weighted, aggregate_majority, has_converged, Candidate};
use futures::future::join_all;
use helix_cache::Cache;
use helix_core::chat::{AttemptOutcome, AttemptRecord, EnsembleResponse};
use helix_core::{AdapterResponse, ChatRequest, HelixError, Outcome, ProviderId, Result, Usage};
use helix_registry::Registry;
use helix_telemetry::{Component, EventOutcome, ObservabilityEvent};
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// How long a cached per-provider completion stays fresh (§4.E default TTL
/// applies to the cache itself; this is this call site's requested TTL).
const COMPLETION_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Clone)]
pub struct EnsembleEngine {
    registry: Registry,
    cache: Option<Cache>,
}

struct DispatchGuard {
    handles: Vec<tokio::task::AbortHandle>,
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

impl EnsembleEngine {
    pub fn new(registry: Registry) -> Self {
        Self { registry, cache: None }
    }

    /// Consults the Two-Tier Cache before dispatching to a provider (§4.E
    /// data-flow: "each possibly consulting Cache first").
    pub fn with_cache(mut self, cache: Cache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Entry point matching §4.G: `complete(request, plan)`. `cancel`
    /// fires when the caller's context is done; every in-flight chain is
    /// aborted, not merely asked to stop, to meet the ≤1 s bound.
    pub async fn complete(
        &self,
        request: &ChatRequest,
        config: &EnsembleConfig,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<EnsembleResponse> {
        let plan = resolve_plan(&self.registry, config).await;
        if plan.positions.is_empty() {
            return Err(HelixError::InsufficientQuorum { got: 0, needed: config.min_providers });
        }

        let handles: Vec<_> = plan
            .positions
            .iter()
            .enumerate()
            .map(|(position, pos)| {
                let registry = self.registry.clone();
                let cache = self.cache.clone();
                let request = request.clone();
                let chain = pos.chain.clone();
                let timeout = config.per_call_timeout;
                tokio::spawn(async move { run_chain(position, &registry, cache.as_ref(), &chain, &request, timeout).await })
            })
            .collect();
        let abort_handles: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        // Aborts every still-running position if this future itself is
        // dropped (caller disconnected) without the cancel branch below
        // ever firing — otherwise those tasks would outlive their parent.
        let _dispatch_guard = DispatchGuard { handles: abort_handles.clone() };

        let joined = tokio::select! {
            results = join_all(handles) => results,
            _ = cancel.changed() => {
                for handle in &abort_handles {
                    handle.abort();
                }
                return Err(HelixError::Cancelled);
            }
        };

        let mut attempts = Vec::new();
        let mut candidates = Vec::new();
        for outcome in joined {
            let (records, response) = match outcome {
                Ok(pair) => pair,
                Err(_) => continue, // task was aborted or panicked; no records to add
            };
            attempts.extend(records);
            if let Some((provider_id, response, latency_ms)) = response {
                candidates.push(Candidate {
                    provider_id,
                    content: response.content,
                    confidence: response.confidence,
                    latency_ms,
                });
            }
        }

        if candidates.len() < config.min_providers {
            if config.fallback_to_best && !candidates.is_empty() {
                let best = candidates
                    .iter()
                    .min_by_key(|c| c.latency_ms)
                    .expect("non-empty checked above")
                    .clone();
                return Ok(build_response(best.content, "fallback-to-best", attempts));
            }
            return Err(HelixError::InsufficientQuorum { got: candidates.len(), needed: config.min_providers });
        }

        let (winner, strategy_used) = match config.strategy {
            Strategy::Majority => (
                aggregate_majority(&candidates).expect("non-empty checked above").content,
                "majority".to_string(),
            ),
            Strategy::ConfidenceWeighted => (
                aggregate_confidence_weighted(&candidates).expect("non-empty checked above").content,
                "confidence-weighted".to_string(),
            ),
            Strategy::Consensus => self.aggregate_consensus(&candidates, config).await,
        };

        Ok(build_response(winner, &strategy_used, attempts))
    }

    /// §4.G consensus: up to `config.consensus_rounds` synthesis rounds
    /// against a selected arbiter, stopping once surviving answers agree
    /// within `confidence_threshold`. Always bounded; on exhaustion falls
    /// back to the confidence-weighted result per the open-question fix.
    async fn aggregate_consensus(&self, candidates: &[Candidate], config: &EnsembleConfig) -> (String, String) {
        let mut current = candidates.to_vec();
        let mut round = 0;
        while round < config.consensus_rounds && !has_converged(&current, config.confidence_threshold) {
            let arbiter_id = current
                .iter()
                .max_by(|a, b| a.confidence.unwrap_or(0.5).partial_cmp(&b.confidence.unwrap_or(0.5)).unwrap())
                .map(|c| c.provider_id.clone());

            let Some(arbiter_id) = arbiter_id else { break };
            let Some(adapter) = self.registry.adapter(&ProviderId::new(arbiter_id.clone())).await else { break };

            let synthesis_request = build_synthesis_request(&current);
            match adapter.complete(&synthesis_request, config.per_call_timeout).await {
                Ok(response) => {
                    current = vec![Candidate {
                        provider_id: arbiter_id,
                        content: response.content,
                        confidence: response.confidence,
                        latency_ms: 0,
                    }];
                }
                Err(_) => break,
            }
            round += 1;
        }

        if current.len() == 1 {
            (current[0].content.clone(), "consensus".to_string())
        } else {
            (
                aggregate_confidence_weighted(candidates)
                    .map(|c| c.content)
                    .unwrap_or_default(),
                "confidence-weighted (consensus unreached)".to_string(),
            )
        }
    }
}

fn build_synthesis_request(current: &[Candidate]) -> ChatRequest {
    use helix_core::chat::ChatMessage;
    let joined = current
        .iter()
        .enumerate()
        .map(|(i, c)| format!("Answer {}: {}", i + 1, c.content))
        .collect::<Vec<_>>()
        .join("\n");
    ChatRequest {
        model: "ensemble-arbiter".to_string(),
        messages: vec![ChatMessage::system(
            "Synthesise the following independent answers into a single best answer.",
        ), ChatMessage::user(joined)],
        temperature: None,
        top_p: None,
        max_tokens: None,
        stream: false,
        response_format: None,
        tools: None,
    }
}

/// Deterministic key for one (provider, request) pair so repeated fan-outs
/// of the same prompt reuse a cached completion instead of re-dispatching.
fn completion_cache_key(provider_id: &ProviderId, request: &ChatRequest) -> String {
    use std::collections::hash_map::DefaultHasher;
    let mut hasher = DefaultHasher::new();
    // `ChatRequest` carries no `Hash` impl (it embeds a free-form JSON
    // `tools` value); hash its canonical JSON encoding instead.
    if let Ok(json) = serde_json::to_string(request) {
        json.hash(&mut hasher);
    }
    format!("completion:{provider_id}:{:x}", hasher.finish())
}

fn build_response(content: String, strategy_used: &str, attempts: Vec<AttemptRecord>) -> EnsembleResponse {
    EnsembleResponse { content, usage: Usage::default(), attempts, strategy_used: strategy_used.to_string() }
}

/// Drives one position's serial fallback chain: try the primary, then on
/// a retryable failure the next provider, stopping at the first success
/// or when the chain is exhausted. Returns every attempt made plus the
/// winning response, if any.
async fn run_chain(
    position: usize,
    registry: &Registry,
    cache: Option<&Cache>,
    chain: &[ProviderId],
    request: &ChatRequest,
    timeout: Duration,
) -> (Vec<AttemptRecord>, Option<(String, AdapterResponse, u64)>) {
    let mut records = Vec::with_capacity(chain.len());
    for provider_id in chain {
        let Some(adapter) = registry.adapter(provider_id).await else { continue };

        let cache_key = (!request.stream).then(|| completion_cache_key(provider_id, request));
        if let Some(key) = &cache_key {
            if let Some(cache) = cache {
                if let Ok(Some(bytes)) = cache.get(key).await {
                    if let Ok(response) = serde_json::from_slice::<AdapterResponse>(&bytes) {
                        records.push(AttemptRecord {
                            position,
                            provider_id: provider_id.to_string(),
                            latency_ms: 0,
                            outcome: AttemptOutcome::Success { confidence: response.confidence },
                        });
                        return (records, Some((provider_id.to_string(), response, 0)));
                    }
                }
            }
        }

        let started = Instant::now();
        let outcome = adapter.complete(request, timeout).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(response) => {
                registry.observe(provider_id, Outcome::Success, latency_ms).await;
                if let (Some(key), Some(cache)) = (&cache_key, cache) {
                    if let Ok(bytes) = serde_json::to_vec(&response) {
                        let tag = format!("prov:{provider_id}");
                        let _ = cache.set(key, bytes, COMPLETION_CACHE_TTL, vec![tag]).await;
                    }
                }
                records.push(AttemptRecord {
                    position,
                    provider_id: provider_id.to_string(),
                    latency_ms,
                    outcome: AttemptOutcome::Success { confidence: response.confidence },
                });
                return (records, Some((provider_id.to_string(), response, latency_ms)));
            }
            Err(error) => {
                let registry_outcome =
                    if matches!(error, HelixError::Unauthorised(_)) { Outcome::AuthFailure } else { Outcome::OtherFailure };
                registry.observe(provider_id, registry_outcome, latency_ms).await;
                records.push(AttemptRecord {
                    position,
                    provider_id: provider_id.to_string(),
                    latency_ms,
                    outcome: AttemptOutcome::Failed { error_code: error.code().to_string() },
                });
                helix_telemetry::emit(
                    ObservabilityEvent::new(Component::Ensemble, EventOutcome::Failure, latency_ms)
                        .with_provider(provider_id.to_string())
                        .with_detail(error.to_string()),
                );
                if !error.is_retryable() {
                    break;
                }
            }
        }
    }
    (records, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use helix_core::provider::{Capability, ProviderAdapter};
    use helix_core::{AuthMode, FinishReason, ProviderFamily};
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct ScriptedAdapter {
        id: ProviderId,
        capabilities: BTreeSet<Capability>,
        content: String,
        confidence: Option<f32>,
        fail_first_n: AtomicUsize,
    }

    #[async_trait]
    impl ProviderAdapter for ScriptedAdapter {
        fn id(&self) -> &ProviderId {
            &self.id
        }
        fn capabilities(&self) -> &BTreeSet<Capability> {
            &self.capabilities
        }
        async fn complete(&self, _request: &ChatRequest, _deadline: Duration) -> Result<AdapterResponse> {
            if self.fail_first_n.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
                return Err(HelixError::TransientBackend("scripted failure".into()));
            }
            Ok(AdapterResponse {
                content: self.content.clone(),
                usage: Usage::default(),
                confidence: self.confidence,
                finish_reason: FinishReason::Stop,
            })
        }
    }

    async fn register(
        registry: &Registry,
        id: &str,
        content: &str,
        confidence: Option<f32>,
        fail_first_n: usize,
        score: f32,
    ) {
        let descriptor = helix_core::ProviderDescriptor::new(
            id,
            id,
            ProviderFamily::Other,
            AuthMode::ApiKey,
            "https://example.test",
        );
        registry
            .register(
                Arc::new(ScriptedAdapter {
                    id: ProviderId::new(id),
                    capabilities: BTreeSet::new(),
                    content: content.to_string(),
                    confidence,
                    fail_first_n: AtomicUsize::new(fail_first_n),
                }),
                descriptor,
            )
            .await;
        registry.set_score(&ProviderId::new(id), score).await;
    }

    fn request() -> ChatRequest {
        use helix_core::chat::ChatMessage;
        ChatRequest {
            model: "ensemble".into(),
            messages: vec![ChatMessage::user("where is the capital?")],
            temperature: None,
            top_p: None,
            max_tokens: None,
            stream: false,
            response_format: None,
            tools: None,
        }
    }

    #[tokio::test]
    async fn majority_vote_picks_most_common_answer() {
        let registry = Registry::new();
        register(&registry, "a", "Paris", Some(0.7), 0, 9.0).await;
        register(&registry, "b", "Paris", Some(0.6), 0, 8.0).await;
        register(&registry, "c", "Lyon", Some(0.9), 0, 7.0).await;

        let engine = EnsembleEngine::new(registry);
        let config = EnsembleConfig {
            k: 3,
            fallback_depth: 0,
            min_providers: 2,
            strategy: Strategy::Majority,
            ..Default::default()
        };
        let (_tx, rx) = watch::channel(false);
        let response = engine.complete(&request(), &config, rx).await.unwrap();
        assert_eq!(response.content, "Paris");
        assert_eq!(response.strategy_used, "majority");
        assert_eq!(response.attempts.len(), 3);
    }

    #[tokio::test]
    async fn fallback_chain_recovers_from_primary_failure() {
        let registry = Registry::new();
        register(&registry, "primary", "ignored", None, 1, 9.0).await;
        register(&registry, "fallback", "ok", Some(0.8), 0, 8.0).await;

        let engine = EnsembleEngine::new(registry);
        let config = EnsembleConfig { k: 1, fallback_depth: 1, min_providers: 1, ..Default::default() };
        let (_tx, rx) = watch::channel(false);
        let response = engine.complete(&request(), &config, rx).await.unwrap();
        assert_eq!(response.content, "ok");
        assert_eq!(response.attempts.len(), 2);
        assert!(matches!(response.attempts[0].outcome, AttemptOutcome::Failed { .. }));
        assert!(matches!(response.attempts[1].outcome, AttemptOutcome::Success { .. }));
    }

    #[tokio::test]
    async fn insufficient_quorum_without_fallback_to_best() {
        let registry = Registry::new();
        register(&registry, "only", "Paris", Some(0.7), 0, 5.0).await;

        let engine = EnsembleEngine::new(registry);
        let config = EnsembleConfig { k: 1, fallback_depth: 0, min_providers: 2, ..Default::default() };
        let (_tx, rx) = watch::channel(false);
        let error = engine.complete(&request(), &config, rx).await.unwrap_err();
        assert!(matches!(error, HelixError::InsufficientQuorum { got: 1, needed: 2 }));
    }

    #[tokio::test]
    async fn fallback_to_best_returns_single_result() {
        let registry = Registry::new();
        register(&registry, "only", "Paris", Some(0.7), 0, 5.0).await;

        let engine = EnsembleEngine::new(registry);
        let config = EnsembleConfig {
            k: 1,
            fallback_depth: 0,
            min_providers: 2,
            fallback_to_best: true,
            ..Default::default()
        };
        let (_tx, rx) = watch::channel(false);
        let response = engine.complete(&request(), &config, rx).await.unwrap();
        assert_eq!(response.content, "Paris");
        assert_eq!(response.strategy_used, "fallback-to-best");
    }

    struct CountingAdapter {
        id: ProviderId,
        capabilities: BTreeSet<Capability>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ProviderAdapter for CountingAdapter {
        fn id(&self) -> &ProviderId {
            &self.id
        }
        fn capabilities(&self) -> &BTreeSet<Capability> {
            &self.capabilities
        }
        async fn complete(&self, _request: &ChatRequest, _deadline: Duration) -> Result<AdapterResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(AdapterResponse {
                content: "cached answer".into(),
                usage: Usage::default(),
                confidence: Some(0.9),
                finish_reason: FinishReason::Stop,
            })
        }
    }

    #[tokio::test]
    async fn repeated_request_is_served_from_cache() {
        let registry = Registry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let descriptor = helix_core::ProviderDescriptor::new(
            "only",
            "only",
            ProviderFamily::Other,
            AuthMode::ApiKey,
            "https://example.test",
        );
        registry
            .register(
                Arc::new(CountingAdapter { id: ProviderId::new("only"), capabilities: BTreeSet::new(), calls: calls.clone() }),
                descriptor,
            )
            .await;
        registry.set_score(&ProviderId::new("only"), 5.0).await;

        let cache =
            helix_cache::Cache::new(helix_cache::CacheConfig::default(), None, helix_telemetry::MetricsRegistry::new());
        let engine = EnsembleEngine::new(registry).with_cache(cache);
        let config = EnsembleConfig { k: 1, fallback_depth: 0, min_providers: 1, ..Default::default() };

        let (_tx, rx) = watch::channel(false);
        let first = engine.complete(&request(), &config, rx.clone()).await.unwrap();
        let second = engine.complete(&request(), &config, rx).await.unwrap();

        assert_eq!(first.content, "cached answer");
        assert_eq!(second.content, "cached answer");
        assert_eq!(calls.load(Ordering::SeqCst), 1, "second dispatch should be served from cache");
    }
}
