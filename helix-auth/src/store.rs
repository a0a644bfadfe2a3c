//! The Credential Store (§4.A): reads OAuth2 credential files, refreshes
//! proactively before expiry, and persists updates atomically.

use crate::atomic_write::{read_with_mode, write_atomic};
use crate::record::{CredentialRecord, REFRESH_COOLDOWN};
use crate::source::CredentialSource;
use helix_core::{HelixError, RefreshEvent, RefreshHistory, RefreshStatus, RefreshType, Result};
use helix_telemetry::{Component, EventOutcome, ObservabilityEvent};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// The result of a successful [`CredentialStore::token`] call.
#[derive(Debug, Clone)]
pub struct Token {
    pub access: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    /// Whether this call performed a refresh rather than serving a cached value.
    pub refreshed: bool,
}

struct CachedRecord {
    record: CredentialRecord,
    cached_at: chrono::DateTime<chrono::Utc>,
}

struct ToolState {
    source: Arc<dyn CredentialSource>,
    cache: RwLock<Option<CachedRecord>>,
    /// Per-tool exclusion so only one refresh runs at a time; readers never
    /// block behind it (§4.A concurrency note, §5).
    refresh_lock: Mutex<()>,
    last_refresh_attempt: RwLock<Option<chrono::DateTime<chrono::Utc>>>,
}

/// Owns every known [`CredentialRecord`] (§3 Ownership). Holds one
/// [`CredentialSource`] per recognised tool and a read-mostly in-memory
/// cache backed by a per-tool refresh mutex.
pub struct CredentialStore {
    tools: HashMap<String, ToolState>,
    http: reqwest::Client,
    history: Arc<Mutex<RefreshHistory>>,
    metrics: helix_telemetry::MetricsRegistry,
}

#[derive(serde::Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
}

impl CredentialStore {
    pub fn new(sources: Vec<Arc<dyn CredentialSource>>, metrics: helix_telemetry::MetricsRegistry) -> Self {
        let tools = sources
            .into_iter()
            .map(|source| {
                (
                    source.tool().to_string(),
                    ToolState {
                        source,
                        cache: RwLock::new(None),
                        refresh_lock: Mutex::new(()),
                        last_refresh_attempt: RwLock::new(None),
                    },
                )
            })
            .collect();
        Self {
            tools,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client build"),
            history: Arc::new(Mutex::new(RefreshHistory::new(200))),
            metrics,
        }
    }

    /// Default store wired to the two recognised CLI tools.
    pub fn with_default_sources(metrics: helix_telemetry::MetricsRegistry) -> Self {
        Self::new(
            vec![
                Arc::new(crate::source::ClaudeCodeSource::new()),
                Arc::new(crate::source::QwenCodeSource::new()),
            ],
            metrics,
        )
    }

    /// Reads a recognised environment flag for `tool`. Both the correct
    /// spelling and the legacy `OUATH` typo are honoured, per §9's open
    /// question — preference order when both are set is intentionally
    /// unspecified (either being `true` enables the tool).
    pub fn enabled(&self, tool: &str) -> bool {
        let (correct, typo) = match tool {
            "claude-code" => ("CLAUDE_CODE_USE_OAUTH_CREDENTIALS", "CLAUDE_CODE_USE_OUATH_CREDENTIALS"),
            "qwen-code" => ("QWEN_CODE_USE_OAUTH_CREDENTIALS", "QWEN_CODE_USE_OUATH_CREDENTIALS"),
            _ => return false,
        };
        env_flag_true(correct) || env_flag_true(typo)
    }

    /// Return a currently-valid token for `tool`, refreshing on demand if
    /// the cached record is inside the refresh threshold and a refresh
    /// token is available.
    pub async fn token(&self, tool: &str) -> Result<Token> {
        let state = self.tools.get(tool).ok_or_else(|| HelixError::NoCredential(tool.to_string()))?;
        let now = chrono::Utc::now();

        let cached = self.cached_or_load(state, tool, now).await?;

        if !cached.needs_refresh(now) {
            return Ok(Token { access: cached.access_token, expires_at: cached.expires_at, refreshed: false });
        }

        if cached.refresh_token.is_none() {
            if cached.is_expired(now) {
                return Err(HelixError::CredentialExpired { tool: tool.to_string() });
            }
            // Still valid for now; no refresh token to extend it with.
            return Ok(Token { access: cached.access_token, expires_at: cached.expires_at, refreshed: false });
        }

        match self.refresh(state, tool, &cached).await {
            Ok(refreshed) => Ok(Token { access: refreshed.access_token, expires_at: refreshed.expires_at, refreshed: true }),
            Err(e) => {
                // Step 6: on failure but existing token still valid, keep serving it.
                if !cached.is_expired(now) {
                    tracing::warn!(tool, error = %e, "credential refresh failed, serving cached token");
                    Ok(Token { access: cached.access_token, expires_at: cached.expires_at, refreshed: false })
                } else {
                    Err(e)
                }
            }
        }
    }

    async fn cached_or_load(
        &self,
        state: &ToolState,
        tool: &str,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<CredentialRecord> {
        {
            let cache = state.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if now - cached.cached_at < crate::record::CACHE_TTL {
                    return Ok(cached.record.clone());
                }
            }
        }

        let path = state.source.path();
        let (bytes, mode) = read_with_mode(&path)
            .await
            .map_err(|_| HelixError::NoCredential(tool.to_string()))?;
        let record = state.source.parse(&path, mode, &bytes)?;

        let mut cache = state.cache.write().await;
        *cache = Some(CachedRecord { record: record.clone(), cached_at: now });
        Ok(record)
    }

    async fn refresh(&self, state: &ToolState, tool: &str, current: &CredentialRecord) -> Result<CredentialRecord> {
        let now = chrono::Utc::now();
        {
            let last = state.last_refresh_attempt.read().await;
            if let Some(last_at) = *last {
                if now - last_at < REFRESH_COOLDOWN {
                    return Err(HelixError::RefreshDenied {
                        tool: tool.to_string(),
                        reason: "refresh attempted too recently".to_string(),
                    });
                }
            }
        }

        let _guard = state.refresh_lock.lock().await;
        // Double-check: another task may have refreshed while we waited for the lock.
        {
            let cache = state.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if !cached.record.needs_refresh(chrono::Utc::now()) {
                    return Ok(cached.record.clone());
                }
            }
        }

        *state.last_refresh_attempt.write().await = Some(now);

        let refresh_token = current
            .refresh_token
            .clone()
            .ok_or_else(|| HelixError::CredentialExpired { tool: tool.to_string() })?;

        let mut event = RefreshEvent::started(RefreshType::CredentialRefresh);
        let started = std::time::Instant::now();

        let result = self.do_refresh(state, tool, current, &refresh_token).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => {
                event.finish(RefreshStatus::Succeeded, 1, 0, None);
                helix_telemetry::emit(
                    ObservabilityEvent::new(Component::CredentialStore, EventOutcome::Success, elapsed_ms)
                        .with_provider(tool),
                );
            }
            Err(e) => {
                event.finish(RefreshStatus::Failed, 0, 1, Some(e.to_string()));
                helix_telemetry::emit(
                    ObservabilityEvent::new(Component::CredentialStore, EventOutcome::Failure, elapsed_ms)
                        .with_provider(tool)
                        .with_detail(e.to_string()),
                );
            }
        }
        self.history.lock().await.push(event);
        self.metrics.incr(if result.is_ok() { "credential.refresh.success" } else { "credential.refresh.failure" });

        result
    }

    async fn do_refresh(
        &self,
        state: &ToolState,
        tool: &str,
        current: &CredentialRecord,
        refresh_token: &str,
    ) -> Result<CredentialRecord> {
        let endpoint = state.source.token_endpoint();
        let resp = self
            .http
            .post(&endpoint)
            .form(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)])
            .send()
            .await
            .map_err(|e| HelixError::TransientBackend(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED || resp.status() == reqwest::StatusCode::FORBIDDEN {
            return Err(HelixError::RefreshDenied { tool: tool.to_string(), reason: format!("status {}", resp.status()) });
        }
        if !resp.status().is_success() {
            return Err(HelixError::TransientBackend(format!("token endpoint returned {}", resp.status())));
        }

        let body: TokenEndpointResponse =
            resp.json().await.map_err(|e| HelixError::SchemaMismatch(e.to_string()))?;

        let mut updated = current.clone();
        updated.access_token = body.access_token;
        updated.refresh_token = body.refresh_token.or_else(|| current.refresh_token.clone());
        updated.expires_at = chrono::Utc::now() + chrono::Duration::seconds(body.expires_in);

        let bytes = state.source.serialize(&updated)?;
        write_atomic(&updated.source_path, &bytes, updated.file_mode).await?;

        let mut cache = state.cache.write().await;
        *cache = Some(CachedRecord { record: updated.clone(), cached_at: chrono::Utc::now() });

        Ok(updated)
    }

    /// Periodic background pass over every known tool (§4.A:
    /// `start_background_refresh`). Runs until `stop` resolves; owns its
    /// own detachment per §5 — the only two sanctioned background loops
    /// besides the Verifier's.
    pub async fn start_background_refresh(self: Arc<Self>, mut stop: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(Duration::from_secs(5 * 60));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    for tool in self.tools.keys().cloned().collect::<Vec<_>>() {
                        if !self.enabled(&tool) {
                            continue;
                        }
                        if let Err(e) = self.token(&tool).await {
                            tracing::debug!(tool = %tool, error = %e, "background credential refresh skipped");
                        }
                    }
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        tracing::info!("credential background refresh loop stopping");
                        return;
                    }
                }
            }
        }
    }

    pub async fn refresh_history(&self) -> Vec<RefreshEvent> {
        self.history.lock().await.newest_first()
    }
}

fn env_flag_true(name: &str) -> bool {
    std::env::var(name).map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes")).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_typo_flag_is_honoured() {
        // SAFETY: test runs single-threaded within this process's env manipulation scope.
        unsafe {
            std::env::remove_var("CLAUDE_CODE_USE_OAUTH_CREDENTIALS");
            std::env::set_var("CLAUDE_CODE_USE_OUATH_CREDENTIALS", "true");
        }
        let store = CredentialStore::with_default_sources(helix_telemetry::MetricsRegistry::new());
        assert!(store.enabled("claude-code"));
        unsafe {
            std::env::remove_var("CLAUDE_CODE_USE_OUATH_CREDENTIALS");
        }
    }

    #[test]
    fn unknown_tool_is_never_enabled() {
        let store = CredentialStore::with_default_sources(helix_telemetry::MetricsRegistry::new());
        assert!(!store.enabled("nonexistent-tool"));
    }
}
