//! Structured observability events (§4.I).
//!
//! Every adapter call, cache operation, invalidation, verifier run, and
//! credential refresh emits one of these through [`emit`] in addition to
//! whatever `tracing` spans the call site opens — the struct form is what
//! `helix-server`'s admin routes and any future audit sink consume without
//! having to parse log lines.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    ProviderAdapter,
    Registry,
    Verifier,
    Cache,
    InvalidationBus,
    CredentialStore,
    Ensemble,
    Limiter,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    Success,
    Failure,
    Degraded,
}

/// One structured observability record, per §4.I's minimum field set:
/// component, outcome, latency, provider id (if applicable), byte count,
/// and caller-supplied trace context.
#[derive(Debug, Clone, Serialize)]
pub struct ObservabilityEvent {
    pub component: Component,
    pub outcome: EventOutcome,
    pub latency_ms: u64,
    pub provider_id: Option<String>,
    pub byte_count: Option<u64>,
    pub trace_id: Option<String>,
    pub detail: Option<String>,
}

impl ObservabilityEvent {
    pub fn new(component: Component, outcome: EventOutcome, latency_ms: u64) -> Self {
        Self {
            component,
            outcome,
            latency_ms,
            provider_id: None,
            byte_count: None,
            trace_id: None,
            detail: None,
        }
    }

    pub fn with_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = Some(provider_id.into());
        self
    }

    pub fn with_bytes(mut self, bytes: u64) -> Self {
        self.byte_count = Some(bytes);
        self
    }

    pub fn with_trace(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Emit one observability event as a structured `tracing` event at
/// `info` (success/degraded) or `warn` (failure) level.
pub fn emit(event: ObservabilityEvent) {
    let payload = serde_json::to_string(&event).unwrap_or_default();
    match event.outcome {
        EventOutcome::Failure => {
            tracing::warn!(target: "helix.observability", event = %payload, "observability event")
        }
        _ => tracing::info!(target: "helix.observability", event = %payload, "observability event"),
    }
}
