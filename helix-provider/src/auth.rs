//! Authentication selection for one adapter call (§4.B step i).

use helix_core::{AuthMode, Result};
use std::sync::Arc;

/// Where an adapter's credential comes from.
#[derive(Clone)]
pub enum CredentialSource {
    /// A static API key read once from config/environment.
    ApiKey(String),
    /// A tool name resolved against the shared Credential Store on every call.
    Oauth { store: Arc<helix_auth::CredentialStore>, tool: String },
    /// No authentication required.
    Anonymous,
}

impl CredentialSource {
    pub fn mode(&self) -> AuthMode {
        match self {
            CredentialSource::ApiKey(_) => AuthMode::ApiKey,
            CredentialSource::Oauth { .. } => AuthMode::Oauth,
            CredentialSource::Anonymous => AuthMode::Anonymous,
        }
    }

    /// Resolve the `Authorization`-header-ready bearer/API-key value for
    /// this call. OAuth sources trigger the Credential Store's on-demand
    /// refresh check per §4.A.
    pub async fn resolve(&self) -> Result<Option<String>> {
        match self {
            CredentialSource::ApiKey(key) => Ok(Some(key.clone())),
            CredentialSource::Oauth { store, tool } => {
                let token = store.token(tool).await?;
                Ok(Some(token.access))
            }
            CredentialSource::Anonymous => Ok(None),
        }
    }
}
