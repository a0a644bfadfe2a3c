//! Shared application state injected into every axum handler.

use helix_auth::CredentialStore;
use helix_cache::Cache;
use helix_ensemble::EnsembleEngine;
use helix_registry::{Registry, Verifier};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
    pub cache: Cache,
    pub ensemble: EnsembleEngine,
    pub verifier: Arc<Verifier>,
    pub credentials: Arc<CredentialStore>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}
