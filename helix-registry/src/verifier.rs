//! Startup Verifier (§4.D): an eight-step probe battery run against each
//! registered adapter, folded into a composite `[0,10]` score and written
//! back to the [`crate::Registry`].

use crate::registry::Registry;
use helix_core::provider::ProviderAdapter;
use helix_core::{Capability, ChatMessage, ChatRequest, RefreshEvent, RefreshHistory, RefreshStatus, RefreshType};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Weights from §4.D's composite score table. Must sum to 1.0.
const WEIGHT_SPEED: f32 = 0.25;
const WEIGHT_EFFICIENCY: f32 = 0.20;
const WEIGHT_COST: f32 = 0.25;
const WEIGHT_CAPABILITY_BREADTH: f32 = 0.20;
const WEIGHT_RECENCY: f32 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Reachability,
    Auth,
    SimpleCompletion,
    StreamingCompletion,
    JsonMode,
    FunctionCalling,
    LongContext,
    RateLimitDisclosure,
}

const ALL_STEPS: [Step; 8] = [
    Step::Reachability,
    Step::Auth,
    Step::SimpleCompletion,
    Step::StreamingCompletion,
    Step::JsonMode,
    Step::FunctionCalling,
    Step::LongContext,
    Step::RateLimitDisclosure,
];

struct StepOutcome {
    passed: bool,
    latency_ms: u64,
}

/// Per-model facts the Verifier cannot observe by probing alone (declared
/// cost, model release date, observed tokens/sec). Supplied by the caller
/// — typically sourced from a Models.dev-style metadata mirror, which is
/// out of scope here per §1.
#[derive(Debug, Clone, Copy)]
pub struct ProviderFacts {
    pub cost_per_1k_tokens_usd: f32,
    pub tokens_per_second: f32,
    pub model_age_days: u32,
}

impl Default for ProviderFacts {
    fn default() -> Self {
        Self { cost_per_1k_tokens_usd: 1.0, tokens_per_second: 20.0, model_age_days: 180 }
    }
}

/// Runs the eight-step battery and composite scoring, appending a
/// [`RefreshEvent`] to a shared history each pass (§6's refresh-history
/// table).
pub struct Verifier {
    registry: Registry,
    history: Arc<Mutex<RefreshHistory>>,
}

impl Verifier {
    pub fn new(registry: Registry, history: Arc<Mutex<RefreshHistory>>) -> Self {
        Self { registry, history }
    }

    /// Newest-first verifier sweep history, for `/admin/models/metadata/refresh/status`.
    pub async fn history(&self) -> Vec<RefreshEvent> {
        self.history.lock().await.newest_first()
    }

    /// Probe every registered adapter and write back its composite score.
    pub async fn run_once(&self, facts_for: impl Fn(&str) -> ProviderFacts) {
        let mut event = RefreshEvent::started(RefreshType::VerifierSweep);
        let descriptors = self.registry.list(&[]).await;
        let mut succeeded = 0u32;
        let mut failed = 0u32;

        struct Probed {
            id: helix_core::ProviderId,
            median_latency_ms: f64,
            capability_pass_fraction: f32,
            facts: ProviderFacts,
        }

        let mut probed = Vec::with_capacity(descriptors.len());
        for descriptor in &descriptors {
            let Some(adapter) = self.registry.adapter(&descriptor.id).await else { continue };
            let caps: Vec<Capability> = descriptor.capabilities.iter().copied().collect();
            let outcomes = self.run_battery(adapter.as_ref(), &caps).await;

            if outcomes[0].passed && outcomes[1].passed {
                succeeded += 1;
            } else {
                failed += 1;
            }

            probed.push(Probed {
                id: descriptor.id.clone(),
                median_latency_ms: median_ms(&outcomes),
                capability_pass_fraction: capability_pass_fraction(&outcomes, &descriptor.capabilities),
                facts: facts_for(descriptor.id.as_ref()),
            });
        }

        let max_latency = probed.iter().map(|p| p.median_latency_ms).fold(1.0_f64, f64::max);

        for p in &probed {
            let score = composite_score(p.median_latency_ms, max_latency, &p.facts, p.capability_pass_fraction);
            self.registry.set_score(&p.id, score).await;
        }

        event.finish(RefreshStatus::Succeeded, succeeded, failed, None);
        self.history.lock().await.push(event);
    }

    async fn run_battery(&self, adapter: &dyn ProviderAdapter, capabilities: &[Capability]) -> Vec<StepOutcome> {
        let mut outcomes = Vec::with_capacity(ALL_STEPS.len());
        for step in ALL_STEPS {
            outcomes.push(self.run_step(adapter, step, capabilities).await);
        }
        outcomes
    }

    async fn run_step(&self, adapter: &dyn ProviderAdapter, step: Step, capabilities: &[Capability]) -> StepOutcome {
        let advertised = match step {
            Step::StreamingCompletion => capabilities.contains(&Capability::Streaming),
            Step::JsonMode => capabilities.contains(&Capability::JsonMode),
            Step::FunctionCalling => capabilities.contains(&Capability::FunctionCalling),
            _ => true,
        };
        if !advertised {
            return StepOutcome { passed: true, latency_ms: 0 };
        }

        let request = probe_request(step);
        let started = Instant::now();
        let result = adapter.complete(&request, PROBE_TIMEOUT).await;
        let latency_ms = started.elapsed().as_millis() as u64;
        StepOutcome { passed: result.is_ok(), latency_ms }
    }
}

fn probe_request(step: Step) -> ChatRequest {
    let content = match step {
        Step::LongContext => "x".repeat(4096),
        _ => "ping".to_string(),
    };
    ChatRequest {
        model: "verifier-probe".into(),
        messages: vec![ChatMessage::user(content)],
        temperature: None,
        top_p: None,
        max_tokens: Some(16),
        stream: false,
        response_format: None,
        tools: None,
    }
}

fn median_ms(outcomes: &[StepOutcome]) -> f64 {
    let mut latencies: Vec<u64> = outcomes.iter().filter(|o| o.passed).map(|o| o.latency_ms).collect();
    if latencies.is_empty() {
        return f64::MAX;
    }
    latencies.sort_unstable();
    latencies[latencies.len() / 2] as f64
}

fn capability_pass_fraction(outcomes: &[StepOutcome], capabilities: &std::collections::BTreeSet<Capability>) -> f32 {
    if capabilities.is_empty() {
        return 1.0;
    }
    let relevant = [Step::StreamingCompletion, Step::JsonMode, Step::FunctionCalling];
    let advertised_count = [
        (Capability::Streaming, relevant[0]),
        (Capability::JsonMode, relevant[1]),
        (Capability::FunctionCalling, relevant[2]),
    ]
    .iter()
    .filter(|(cap, _)| capabilities.contains(cap))
    .count();
    if advertised_count == 0 {
        return 1.0;
    }
    let passed_count = ALL_STEPS
        .iter()
        .zip(outcomes.iter())
        .filter(|(step, outcome)| relevant.contains(step) && outcome.passed)
        .count();
    passed_count as f32 / advertised_count as f32
}

fn composite_score(median_latency_ms: f64, max_latency_ms: f64, facts: &ProviderFacts, capability_pass_fraction: f32) -> f32 {
    let speed = if max_latency_ms > 0.0 { 1.0 - (median_latency_ms / max_latency_ms) } else { 1.0 };
    let efficiency = (facts.tokens_per_second / 100.0).min(1.0);
    let cost = (1.0 / facts.cost_per_1k_tokens_usd.max(0.01)).min(1.0);
    let recency = (1.0 - (facts.model_age_days as f32 / 730.0)).clamp(0.0, 1.0);

    let raw = WEIGHT_SPEED * speed as f32
        + WEIGHT_EFFICIENCY * efficiency
        + WEIGHT_COST * cost
        + WEIGHT_CAPABILITY_BREADTH * capability_pass_fraction
        + WEIGHT_RECENCY * recency;

    (raw * 10.0).clamp(0.0, 10.0)
}
