//! Resolving an [`EnsembleConfig`] into a concrete dispatch plan (§4.G
//! step 1): `K` independent positions, each a primary plus up to
//! `fallback_depth` fallbacks drawn from the Registry's ranked snapshot.

use helix_core::{Capability, ProviderId};
use helix_registry::Registry;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    Majority,
    ConfidenceWeighted,
    Consensus,
}

#[derive(Debug, Clone)]
pub struct EnsembleConfig {
    /// Number of independent fan-out positions.
    pub k: usize,
    /// Fallbacks per position beyond the primary, capped at 4 per §4.G.
    pub fallback_depth: usize,
    pub capabilities: Vec<Capability>,
    pub strategy: Strategy,
    pub min_providers: usize,
    pub fallback_to_best: bool,
    pub per_call_timeout: Duration,
    /// Bound `R` on consensus synthesis rounds.
    pub consensus_rounds: usize,
    pub confidence_threshold: f32,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            k: 3,
            fallback_depth: 1,
            capabilities: Vec::new(),
            strategy: Strategy::Majority,
            min_providers: 2,
            fallback_to_best: false,
            per_call_timeout: Duration::from_secs(60),
            consensus_rounds: 3,
            confidence_threshold: 0.8,
        }
    }
}

/// One fan-out position's serial fallback chain, primary first.
#[derive(Debug, Clone)]
pub struct Position {
    pub chain: Vec<ProviderId>,
}

#[derive(Debug, Clone, Default)]
pub struct EnsemblePlan {
    pub positions: Vec<Position>,
}

/// Builds `config.k` independent chains from the Registry's current
/// `select_top_k` snapshot. Positions draw from the same ranked pool but
/// never repeat a provider within their own chain; the pool is consulted
/// once so the whole plan is a pure function of one snapshot (§8
/// "Registry determinism").
pub async fn resolve_plan(registry: &Registry, config: &EnsembleConfig) -> EnsemblePlan {
    let chain_len = config.fallback_depth.min(4) + 1;
    let pool_size = config.k * chain_len;
    let ranked = registry.select_top_k(pool_size.max(config.k), &config.capabilities).await;
    if ranked.is_empty() {
        return EnsemblePlan::default();
    }

    let mut positions = Vec::with_capacity(config.k);
    for position in 0..config.k {
        let mut chain = Vec::with_capacity(chain_len);
        let mut offset = position;
        while chain.len() < chain_len && chain.len() < ranked.len() {
            let candidate = &ranked[offset % ranked.len()].id;
            if !chain.contains(candidate) {
                chain.push(candidate.clone());
            }
            offset += 1;
            if offset - position > ranked.len() * 2 {
                break; // pool exhausted of distinct providers
            }
        }
        positions.push(Position { chain });
    }
    EnsemblePlan { positions }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helix_core::provider::ProviderAdapter;
    use helix_core::{AdapterResponse, AuthMode, ChatRequest, FinishReason, ProviderFamily, Usage};
    use std::collections::BTreeSet;
    use std::sync::Arc;

    struct StubAdapter {
        id: ProviderId,
    }

    #[async_trait::async_trait]
    impl ProviderAdapter for StubAdapter {
        fn id(&self) -> &ProviderId {
            &self.id
        }
        fn capabilities(&self) -> &BTreeSet<Capability> {
            static EMPTY: std::sync::OnceLock<BTreeSet<Capability>> = std::sync::OnceLock::new();
            EMPTY.get_or_init(BTreeSet::new)
        }
        async fn complete(&self, _request: &ChatRequest, _deadline: Duration) -> helix_core::Result<AdapterResponse> {
            Ok(AdapterResponse {
                content: "stub".into(),
                usage: Usage::default(),
                confidence: None,
                finish_reason: FinishReason::Stop,
            })
        }
    }

    async fn registry_with(n: usize) -> Registry {
        let registry = Registry::new();
        for i in 0..n {
            let id = format!("p{i}");
            let descriptor = helix_core::ProviderDescriptor::new(
                id.clone(),
                id.clone(),
                ProviderFamily::Other,
                AuthMode::ApiKey,
                "https://example.test",
            );
            registry.register(Arc::new(StubAdapter { id: ProviderId::new(id) }), descriptor).await;
            registry.set_score(&ProviderId::new(format!("p{i}")), (n - i) as f32).await;
        }
        registry
    }

    #[tokio::test]
    async fn builds_k_distinct_chains() {
        let registry = registry_with(6).await;
        let config = EnsembleConfig { k: 3, fallback_depth: 1, ..Default::default() };
        let plan = resolve_plan(&registry, &config).await;
        assert_eq!(plan.positions.len(), 3);
        for position in &plan.positions {
            assert_eq!(position.chain.len(), 2);
        }
    }

    #[tokio::test]
    async fn empty_registry_yields_empty_plan() {
        let registry = Registry::new();
        let plan = resolve_plan(&registry, &EnsembleConfig::default()).await;
        assert!(plan.positions.is_empty());
    }
}
