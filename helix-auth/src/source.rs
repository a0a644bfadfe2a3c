//! Pluggable credential sources: one per CLI tool whose OAuth2 file this
//! store knows how to read, refresh, and persist.
//!
//! The distilled spec fixes exactly two tools (`claude-code`, `qwen-code`);
//! the trait seam exists so the loader in [`crate::store::CredentialStore`]
//! doesn't hardcode either file shape, matching how the ambient ecosystem
//! this crate is drawn from grows CLI-tool support over time without
//! touching the refresh/persist pipeline (out of scope to add more tools
//! here — see `SPEC_FULL.md`).

use crate::record::{ClaudeCredentialsFile, CredentialRecord, QwenCredentialsFile};
use async_trait::async_trait;
use helix_core::{HelixError, Result};
use std::path::{Path, PathBuf};

/// Default owner-only file mode (`0600`) enforced for every credential
/// file this crate writes, matching §6's "mode must be 0600".
#[cfg(unix)]
pub const OWNER_RW_ONLY: u32 = 0o600;

#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// The tool name used in env flags and the `CredentialRecord.tool` field.
    fn tool(&self) -> &'static str;

    /// Path to the on-disk credential file for this tool.
    fn path(&self) -> PathBuf;

    /// Token endpoint to POST `grant_type=refresh_token` to.
    fn token_endpoint(&self) -> String;

    /// Parse the tool-specific JSON shape into a [`CredentialRecord`].
    fn parse(&self, path: &Path, mode: u32, bytes: &[u8]) -> Result<CredentialRecord>;

    /// Serialize a refreshed record back into the tool-specific JSON shape.
    fn serialize(&self, record: &CredentialRecord) -> Result<Vec<u8>>;
}

/// `~/.claude/.credentials.json`.
pub struct ClaudeCodeSource {
    path: PathBuf,
    token_endpoint: String,
}

impl ClaudeCodeSource {
    pub fn new() -> Self {
        let path = dirs_home().join(".claude").join(".credentials.json");
        let token_endpoint = std::env::var("HELIX_CLAUDE_CODE_TOKEN_URL")
            .unwrap_or_else(|_| "https://console.anthropic.com/v1/oauth/token".to_string());
        Self { path, token_endpoint }
    }
}

impl Default for ClaudeCodeSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialSource for ClaudeCodeSource {
    fn tool(&self) -> &'static str {
        "claude-code"
    }

    fn path(&self) -> PathBuf {
        self.path.clone()
    }

    fn token_endpoint(&self) -> String {
        self.token_endpoint.clone()
    }

    fn parse(&self, path: &Path, mode: u32, bytes: &[u8]) -> Result<CredentialRecord> {
        let file: ClaudeCredentialsFile =
            serde_json::from_slice(bytes).map_err(|e| HelixError::SchemaMismatch(e.to_string()))?;
        let oauth = file.claude_ai_oauth;
        Ok(CredentialRecord {
            tool: self.tool().to_string(),
            access_token: oauth.access_token,
            refresh_token: oauth.refresh_token,
            expires_at: millis_to_datetime(oauth.expires_at),
            scopes: oauth.scopes,
            subscription_tier: oauth.subscription_type.or(oauth.rate_limit_tier),
            source_path: path.to_path_buf(),
            file_mode: mode,
        })
    }

    fn serialize(&self, record: &CredentialRecord) -> Result<Vec<u8>> {
        let file = ClaudeCredentialsFile {
            claude_ai_oauth: crate::record::ClaudeAiOauth {
                access_token: record.access_token.clone(),
                refresh_token: record.refresh_token.clone(),
                expires_at: record.expires_at.timestamp_millis(),
                scopes: record.scopes.clone(),
                subscription_type: record.subscription_tier.clone(),
                rate_limit_tier: None,
            },
        };
        serde_json::to_vec_pretty(&file).map_err(|e| HelixError::Internal(e.to_string()))
    }
}

/// `~/.qwen/oauth_creds.json`.
pub struct QwenCodeSource {
    path: PathBuf,
    token_endpoint: String,
}

impl QwenCodeSource {
    pub fn new() -> Self {
        let path = dirs_home().join(".qwen").join("oauth_creds.json");
        let token_endpoint = std::env::var("HELIX_QWEN_CODE_TOKEN_URL")
            .unwrap_or_else(|_| "https://chat.qwen.ai/api/v1/oauth2/token".to_string());
        Self { path, token_endpoint }
    }
}

impl Default for QwenCodeSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialSource for QwenCodeSource {
    fn tool(&self) -> &'static str {
        "qwen-code"
    }

    fn path(&self) -> PathBuf {
        self.path.clone()
    }

    fn token_endpoint(&self) -> String {
        self.token_endpoint.clone()
    }

    fn parse(&self, path: &Path, mode: u32, bytes: &[u8]) -> Result<CredentialRecord> {
        let file: QwenCredentialsFile =
            serde_json::from_slice(bytes).map_err(|e| HelixError::SchemaMismatch(e.to_string()))?;
        Ok(CredentialRecord {
            tool: self.tool().to_string(),
            access_token: file.access_token,
            refresh_token: file.refresh_token,
            expires_at: millis_to_datetime(file.expiry_date),
            scopes: Vec::new(),
            subscription_tier: None,
            source_path: path.to_path_buf(),
            file_mode: mode,
        })
    }

    fn serialize(&self, record: &CredentialRecord) -> Result<Vec<u8>> {
        let file = QwenCredentialsFile {
            access_token: record.access_token.clone(),
            refresh_token: record.refresh_token.clone(),
            expiry_date: record.expires_at.timestamp_millis(),
            token_type: Some("Bearer".to_string()),
            resource_url: None,
        };
        serde_json::to_vec_pretty(&file).map_err(|e| HelixError::Internal(e.to_string()))
    }
}

fn millis_to_datetime(ms: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp_millis(ms).unwrap_or_else(chrono::Utc::now)
}

fn dirs_home() -> PathBuf {
    std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."))
}
