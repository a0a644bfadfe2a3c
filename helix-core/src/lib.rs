//! Shared types, error taxonomy, and the provider contract for HelixAgent.
//!
//! This crate has no I/O of its own — it exists purely so
//! `helix-provider`, `helix-registry`, `helix-cache`, `helix-ensemble`,
//! `helix-auth`, and `helix-server` agree on one vocabulary without
//! depending on each other.

pub mod chat;
pub mod error;
pub mod provider;
pub mod refresh;

pub use chat::{
    AdapterResponse, AttemptOutcome, AttemptRecord, ChatMessage, ChatRequest, EnsembleResponse,
    FinishReason, ResponseFormat, StreamChunk, Usage,
};
pub use error::{HelixError, Result};
pub use provider::{
    AuthMode, Capability, HealthState, Outcome, ProviderAdapter, ProviderDescriptor, ProviderFamily,
    ProviderId,
};
pub use refresh::{RefreshEvent, RefreshHistory, RefreshStatus, RefreshType};
