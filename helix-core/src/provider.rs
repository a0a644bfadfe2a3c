//! Provider Descriptor, capability flags, health state machine, and the
//! uniform [`ProviderAdapter`] trait (§3, §4.B, §4.C).

use crate::chat::{AdapterResponse, ChatRequest};
use crate::error::Result;
use async_trait::async_trait;
use derive_more::{AsRef, Deref, Display, From, Into};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, AsRef, Deref, Into, Serialize, Deserialize,
)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// Family tag used for grouping and for Models.dev-style metadata joins
/// outside the core (out of scope here beyond the label itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderFamily {
    Anthropic,
    OpenaiLike,
    Google,
    Local,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    ApiKey,
    Oauth,
    Anonymous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    Streaming,
    Vision,
    FunctionCalling,
    Reasoning,
    JsonMode,
}

/// Health state machine from §4.C. Transitions are enforced by
/// [`HealthState::next`], never mutated directly by callers — this keeps
/// the state machine diagram in the spec as the single source of truth
/// instead of letting call sites reinvent it ad hoc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    #[default]
    Unknown,
    Healthy,
    Degraded,
    Dead,
}

/// An observed call outcome fed into [`HealthState::next`] and the
/// Registry's rolling error-rate / EWMA bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    AuthFailure,
    OtherFailure,
}

impl HealthState {
    /// Apply one observed outcome plus the rolling counters the Registry
    /// already maintains, returning the next state per the table in §4.C.
    ///
    /// `rolling_error_rate` is over the last 50 calls; `consecutive_successes`
    /// resets to 0 on any failure. `sustained_dead_window` is true once a
    /// provider has shown 100% errors for the full 30-minute sustained
    /// window tracked by the caller.
    pub fn next(
        self,
        outcome: Outcome,
        rolling_error_rate: f64,
        consecutive_successes: u32,
        sustained_dead_window: bool,
    ) -> HealthState {
        if outcome == Outcome::AuthFailure || sustained_dead_window {
            return HealthState::Dead;
        }
        match self {
            HealthState::Unknown => {
                if outcome == Outcome::Success {
                    HealthState::Healthy
                } else {
                    HealthState::Unknown
                }
            }
            HealthState::Healthy => {
                if rolling_error_rate >= 0.20 {
                    HealthState::Degraded
                } else {
                    HealthState::Healthy
                }
            }
            HealthState::Degraded => {
                if consecutive_successes >= 20 {
                    HealthState::Healthy
                } else {
                    HealthState::Degraded
                }
            }
            HealthState::Dead => HealthState::Dead,
        }
    }

    /// Manual reset or the daily sweep: `dead → unknown`, all else unchanged.
    pub fn reset_if_dead(self) -> HealthState {
        if self == HealthState::Dead { HealthState::Unknown } else { self }
    }
}

/// Stable identity of one backend, as owned exclusively by the Registry
/// (§3 Ownership). Immutable after registration except `health` and
/// `score`, which the Registry updates under its write lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub id: ProviderId,
    pub label: String,
    pub family: ProviderFamily,
    pub auth_mode: AuthMode,
    pub capabilities: BTreeSet<Capability>,
    pub base_url: String,
    pub health: HealthState,
    /// Composite score in `[0, 10]`, written back atomically by the Verifier.
    pub score: f32,
}

impl ProviderDescriptor {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        family: ProviderFamily,
        auth_mode: AuthMode,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            id: ProviderId::new(id),
            label: label.into(),
            family,
            auth_mode,
            capabilities: BTreeSet::new(),
            base_url: base_url.into(),
            health: HealthState::Unknown,
            score: 0.0,
        }
    }

    pub fn with_capabilities(mut self, caps: impl IntoIterator<Item = Capability>) -> Self {
        self.capabilities.extend(caps);
        self
    }

    pub fn has_capabilities(&self, required: &[Capability]) -> bool {
        required.iter().all(|c| self.capabilities.contains(c))
    }
}

/// Uniform surface over one external HTTP LLM backend (§4.B).
///
/// Implementations own their own HTTP client and translate the neutral
/// [`ChatRequest`]/[`AdapterResponse`] to and from the backend's wire
/// format. Adapters never retry internally — the fallback chain in
/// `helix-ensemble` owns retry/fallback sequencing, and the wrapper in
/// `helix-limiter` owns rate-limit/circuit-breaker admission control.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable identity, matching the owning [`ProviderDescriptor::id`].
    fn id(&self) -> &ProviderId;

    /// Capabilities this adapter actually implements (used by the Verifier
    /// battery to decide which steps to run).
    fn capabilities(&self) -> &BTreeSet<Capability>;

    /// Perform one non-streaming completion, honouring `deadline`.
    async fn complete(&self, request: &ChatRequest, deadline: std::time::Duration) -> Result<AdapterResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_becomes_healthy_on_first_success() {
        let s = HealthState::Unknown.next(Outcome::Success, 0.0, 1, false);
        assert_eq!(s, HealthState::Healthy);
    }

    #[test]
    fn healthy_degrades_at_error_rate_threshold() {
        let s = HealthState::Healthy.next(Outcome::OtherFailure, 0.20, 0, false);
        assert_eq!(s, HealthState::Degraded);
    }

    #[test]
    fn degraded_needs_twenty_consecutive_successes() {
        let still_degraded = HealthState::Degraded.next(Outcome::Success, 0.0, 19, false);
        assert_eq!(still_degraded, HealthState::Degraded);
        let healed = HealthState::Degraded.next(Outcome::Success, 0.0, 20, false);
        assert_eq!(healed, HealthState::Healthy);
    }

    #[test]
    fn auth_failure_always_kills() {
        let s = HealthState::Healthy.next(Outcome::AuthFailure, 0.0, 5, false);
        assert_eq!(s, HealthState::Dead);
    }

    #[test]
    fn dead_resets_only_via_explicit_call() {
        assert_eq!(HealthState::Dead.next(Outcome::Success, 0.0, 1, false), HealthState::Dead);
        assert_eq!(HealthState::Dead.reset_if_dead(), HealthState::Unknown);
    }

    #[test]
    fn capability_filter_requires_all() {
        let desc = ProviderDescriptor::new(
            "p1",
            "Provider One",
            ProviderFamily::OpenaiLike,
            AuthMode::ApiKey,
            "https://example.test",
        )
        .with_capabilities([Capability::Streaming, Capability::JsonMode]);
        assert!(desc.has_capabilities(&[Capability::Streaming]));
        assert!(!desc.has_capabilities(&[Capability::Vision]));
    }
}
