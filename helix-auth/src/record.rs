//! The Credential Record (§3) and the on-disk JSON shapes for the two
//! shipped CLI tools (§6 Credential files).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Grace window before expiry within which [`crate::store::CredentialStore::token`]
/// attempts a proactive refresh.
pub const REFRESH_THRESHOLD: chrono::Duration = chrono::Duration::minutes(10);

/// How long a valid token may be served from the in-memory cache before a
/// read is allowed to re-check the source file (§3: "cached ≤5 min").
pub const CACHE_TTL: chrono::Duration = chrono::Duration::minutes(5);

/// Minimum spacing between refresh attempts for one tool, so concurrent
/// callers racing the same expiring token don't hammer the token endpoint.
pub const REFRESH_COOLDOWN: chrono::Duration = chrono::Duration::seconds(30);

/// Per-tool credential state, exclusively owned by the Credential Store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub tool: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Millisecond-precision expiry instant.
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub scopes: Vec<String>,
    pub subscription_tier: Option<String>,
    /// Path to the file this record was loaded from / persisted to.
    #[serde(skip)]
    pub source_path: PathBuf,
    /// Unix file mode bits the source file carried when loaded, so a
    /// rewrite can preserve it exactly (§4.A step 4: must stay `0600`).
    #[serde(skip)]
    pub file_mode: u32,
}

impl CredentialRecord {
    /// Invariant (a) from §3: a caller must refresh before using a record
    /// whose expiry has already passed.
    pub fn is_expired(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether `now` falls inside the proactive-refresh window.
    pub fn needs_refresh(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.expires_at - now < REFRESH_THRESHOLD
    }
}

/// `~/.claude/.credentials.json`'s `claudeAiOauth` object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeCredentialsFile {
    #[serde(rename = "claudeAiOauth")]
    pub claude_ai_oauth: ClaudeAiOauth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeAiOauth {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: Option<String>,
    /// Milliseconds since epoch.
    #[serde(rename = "expiresAt")]
    pub expires_at: i64,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(rename = "subscriptionType", default)]
    pub subscription_type: Option<String>,
    #[serde(rename = "rateLimitTier", default)]
    pub rate_limit_tier: Option<String>,
}

/// `~/.qwen/oauth_creds.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QwenCredentialsFile {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Milliseconds since epoch.
    pub expiry_date: i64,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub resource_url: Option<String>,
}
