//! The Provider Registry (§4.C): owns every adapter, publishes health and
//! score, and hands out a ranked selection. Readers never wait behind
//! other readers — each provider's mutable bookkeeping lives behind its
//! own lock rather than one global write lock over the whole map.

use helix_cache::{DomainEvent, InvalidationBus};
use helix_core::provider::ProviderAdapter;
use helix_core::{Capability, HealthState, Outcome, ProviderDescriptor, ProviderId};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::RwLock;

const ERROR_WINDOW: usize = 50;
const DEGRADED_ERROR_RATE: f64 = 0.20;
const HEALTHY_CONSECUTIVE_SUCCESSES: u32 = 20;
const SUSTAINED_DEAD_WINDOW: Duration = Duration::from_secs(30 * 60);
const LATENCY_EWMA_ALPHA: f64 = 0.2;

struct ProviderStats {
    recent_outcomes: VecDeque<bool>,
    ewma_latency_ms: f64,
    consecutive_successes: u32,
    error_streak_start: Option<std::time::Instant>,
}

impl Default for ProviderStats {
    fn default() -> Self {
        Self {
            recent_outcomes: VecDeque::with_capacity(ERROR_WINDOW),
            ewma_latency_ms: 0.0,
            consecutive_successes: 0,
            error_streak_start: None,
        }
    }
}

impl ProviderStats {
    fn rolling_error_rate(&self) -> f64 {
        if self.recent_outcomes.is_empty() {
            return 0.0;
        }
        let failures = self.recent_outcomes.iter().filter(|ok| !**ok).count();
        failures as f64 / self.recent_outcomes.len() as f64
    }

    fn record(&mut self, succeeded: bool, latency_ms: u64) {
        if self.recent_outcomes.len() >= ERROR_WINDOW {
            self.recent_outcomes.pop_front();
        }
        self.recent_outcomes.push_back(succeeded);

        self.ewma_latency_ms = if self.ewma_latency_ms == 0.0 {
            latency_ms as f64
        } else {
            LATENCY_EWMA_ALPHA * latency_ms as f64 + (1.0 - LATENCY_EWMA_ALPHA) * self.ewma_latency_ms
        };

        if succeeded {
            self.consecutive_successes += 1;
            self.error_streak_start = None;
        } else {
            self.consecutive_successes = 0;
            if self.error_streak_start.is_none() {
                self.error_streak_start = Some(std::time::Instant::now());
            }
        }
    }

    fn sustained_dead_window(&self) -> bool {
        self.error_streak_start.map(|start| start.elapsed() >= SUSTAINED_DEAD_WINDOW).unwrap_or(false)
    }
}

struct Entry {
    adapter: Arc<dyn ProviderAdapter>,
    descriptor: RwLock<ProviderDescriptor>,
    stats: RwLock<ProviderStats>,
}

/// Owns the full set of known providers (§3 Ownership). Cheaply cloneable
/// — internally an `Arc` over the provider map.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RwLock<HashMap<ProviderId, Entry>>>,
    /// Set at most once at startup (§4.F: `provider.health.changed`).
    bus: Arc<OnceLock<InvalidationBus>>,
}

impl Registry {
    pub fn new() -> Self {
        Self { inner: Arc::new(RwLock::new(HashMap::new())), bus: Arc::new(OnceLock::new()) }
    }

    /// Wires an [`InvalidationBus`] so health transitions publish
    /// `provider.health.changed` events. No-op if already set.
    pub fn set_invalidation_bus(&self, bus: InvalidationBus) {
        let _ = self.bus.set(bus);
    }

    pub async fn register(&self, adapter: Arc<dyn ProviderAdapter>, descriptor: ProviderDescriptor) {
        let id = descriptor.id.clone();
        let mut map = self.inner.write().await;
        map.insert(
            id,
            Entry { adapter, descriptor: RwLock::new(descriptor), stats: RwLock::new(ProviderStats::default()) },
        );
    }

    /// Snapshot of every registered descriptor matching `capabilities`
    /// (empty slice matches everything).
    pub async fn list(&self, capabilities: &[Capability]) -> Vec<ProviderDescriptor> {
        let map = self.inner.read().await;
        let mut out = Vec::with_capacity(map.len());
        for entry in map.values() {
            let descriptor = entry.descriptor.read().await;
            if descriptor.has_capabilities(capabilities) {
                out.push(descriptor.clone());
            }
        }
        out
    }

    pub async fn adapter(&self, id: &ProviderId) -> Option<Arc<dyn ProviderAdapter>> {
        let map = self.inner.read().await;
        map.get(id).map(|e| e.adapter.clone())
    }

    /// §4.C selection rule: filter by capability, drop `dead` providers,
    /// sort by score descending, ties by lower EWMA latency then id, take
    /// the first `k`. A pure function of the current snapshot — no
    /// selection call blocks on another.
    pub async fn select_top_k(&self, k: usize, capabilities: &[Capability]) -> Vec<ProviderDescriptor> {
        let map = self.inner.read().await;
        let mut candidates = Vec::new();
        for entry in map.values() {
            let descriptor = entry.descriptor.read().await;
            if descriptor.health == HealthState::Dead || !descriptor.has_capabilities(capabilities) {
                continue;
            }
            let latency = entry.stats.read().await.ewma_latency_ms;
            candidates.push((descriptor.clone(), latency));
        }
        candidates.sort_by(|a, b| {
            b.0.score
                .partial_cmp(&a.0.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| a.0.id.as_ref().cmp(b.0.id.as_ref()))
        });
        candidates.into_iter().take(k).map(|(d, _)| d).collect()
    }

    /// Runs each registered adapter's reachability through the caller's
    /// probe closure and folds the outcome back via [`Registry::observe`].
    /// The Verifier battery lives in [`crate::verifier`]; this is the
    /// lighter-weight liveness sweep referenced by `health_check_all`.
    pub async fn health_check_all<F, Fut>(&self, probe: F)
    where
        F: Fn(Arc<dyn ProviderAdapter>) -> Fut,
        Fut: std::future::Future<Output = (Outcome, u64)>,
    {
        let ids: Vec<ProviderId> = {
            let map = self.inner.read().await;
            map.keys().cloned().collect()
        };
        for id in ids {
            let adapter = self.adapter(&id).await;
            if let Some(adapter) = adapter {
                let (outcome, latency_ms) = probe(adapter).await;
                self.observe(&id, outcome, latency_ms).await;
            }
        }
    }

    /// Feed one observed call outcome back into a provider's health and
    /// latency bookkeeping (§4.C `observe`).
    pub async fn observe(&self, id: &ProviderId, outcome: Outcome, latency_ms: u64) {
        let map = self.inner.read().await;
        let Some(entry) = map.get(id) else { return };

        let mut stats = entry.stats.write().await;
        stats.record(outcome == Outcome::Success, latency_ms);
        let rolling_error_rate = stats.rolling_error_rate();
        let consecutive_successes = stats.consecutive_successes;
        let sustained_dead_window = stats.sustained_dead_window();
        drop(stats);

        let mut descriptor = entry.descriptor.write().await;
        let previous = descriptor.health;
        descriptor.health =
            descriptor.health.next(outcome, rolling_error_rate, consecutive_successes, sustained_dead_window);

        if descriptor.health != previous {
            if let Some(bus) = self.bus.get() {
                bus.publish(DomainEvent {
                    topic: "provider.health.changed".to_string(),
                    payload: serde_json::json!({
                        "provider_id": id.as_ref(),
                        "previous": previous,
                        "current": descriptor.health,
                    }),
                });
            }
        }
    }

    /// `dead → unknown` for every provider, per §4.C's daily sweep / manual reset.
    pub async fn reset_dead(&self) {
        let map = self.inner.read().await;
        for entry in map.values() {
            let mut descriptor = entry.descriptor.write().await;
            descriptor.health = descriptor.health.reset_if_dead();
        }
    }

    /// Writes a freshly computed composite score back to one provider,
    /// used by the Verifier (§4.D: "written back to the Registry atomically").
    pub async fn set_score(&self, id: &ProviderId, score: f32) {
        let map = self.inner.read().await;
        if let Some(entry) = map.get(id) {
            entry.descriptor.write().await.score = score.clamp(0.0, 10.0);
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helix_core::{AuthMode, ChatRequest, ProviderFamily};
    use std::collections::BTreeSet;

    struct StubAdapter {
        id: ProviderId,
        capabilities: BTreeSet<Capability>,
    }

    impl StubAdapter {
        fn new(id: &str) -> Self {
            Self { id: ProviderId::new(id), capabilities: BTreeSet::new() }
        }
    }

    #[async_trait::async_trait]
    impl ProviderAdapter for StubAdapter {
        fn id(&self) -> &ProviderId {
            &self.id
        }

        fn capabilities(&self) -> &BTreeSet<Capability> {
            &self.capabilities
        }

        async fn complete(
            &self,
            _request: &ChatRequest,
            _deadline: Duration,
        ) -> helix_core::Result<helix_core::AdapterResponse> {
            unreachable!("not exercised by registry unit tests")
        }
    }

    #[tokio::test]
    async fn select_top_k_excludes_dead_and_orders_by_score() {
        let registry = Registry::new();
        for (id, score, health) in
            [("a", 9.0, HealthState::Healthy), ("b", 9.5, HealthState::Dead), ("c", 8.0, HealthState::Healthy)]
        {
            let mut descriptor =
                ProviderDescriptor::new(id, id, ProviderFamily::OpenaiLike, AuthMode::ApiKey, "https://x.test");
            descriptor.score = score;
            descriptor.health = health;
            registry.register(Arc::new(StubAdapter::new(id)), descriptor).await;
        }

        let top = registry.select_top_k(2, &[]).await;
        let ids: Vec<&str> = top.iter().map(|d| d.id.as_ref().as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn observe_auth_failure_kills_provider() {
        let registry = Registry::new();
        let descriptor =
            ProviderDescriptor::new("a", "a", ProviderFamily::OpenaiLike, AuthMode::ApiKey, "https://x.test");
        registry.register(Arc::new(StubAdapter::new("a")), descriptor).await;

        let id = ProviderId::new("a");
        registry.observe(&id, Outcome::Success, 10).await;
        registry.observe(&id, Outcome::AuthFailure, 10).await;

        let snapshot = registry.list(&[]).await;
        assert_eq!(snapshot[0].health, HealthState::Dead);
    }
}
