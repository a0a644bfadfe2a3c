//! End-to-end scenario 6 from spec.md §8: proactive refresh, atomic
//! rewrite, mode preservation.

use helix_auth::{ClaudeCodeSource, CredentialStore};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn proactive_refresh_rewrites_file_atomically_with_mode_preserved() {
    let tmp = tempfile::tempdir().unwrap();
    let home = tmp.path();
    let claude_dir = home.join(".claude");
    std::fs::create_dir_all(&claude_dir).unwrap();
    let cred_path = claude_dir.join(".credentials.json");

    let now = chrono::Utc::now();
    let expires_at = now + chrono::Duration::minutes(5); // inside the 10-minute threshold
    let initial = serde_json::json!({
        "claudeAiOauth": {
            "accessToken": "old-access-token",
            "refreshToken": "a-refresh-token",
            "expiresAt": expires_at.timestamp_millis(),
            "scopes": ["chat"],
            "subscriptionType": "pro",
        }
    });
    std::fs::write(&cred_path, serde_json::to_vec(&initial).unwrap()).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&cred_path, std::fs::Permissions::from_mode(0o600)).unwrap();
    }

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "new-access-token",
            "refresh_token": "a-refresh-token",
            "expires_in": 3600,
        })))
        .mount(&server)
        .await;

    unsafe {
        std::env::set_var("HOME", home);
        std::env::set_var("HELIX_CLAUDE_CODE_TOKEN_URL", format!("{}/v1/oauth/token", server.uri()));
    }

    let source: Arc<dyn helix_auth::CredentialSource> = Arc::new(ClaudeCodeSource::new());
    let store = CredentialStore::new(vec![source], helix_telemetry::MetricsRegistry::new());

    let token = store.token("claude-code").await.expect("token should refresh successfully");
    assert_eq!(token.access, "new-access-token");
    assert!(token.refreshed);
    assert!(token.expires_at - now >= chrono::Duration::seconds(3500));

    let rewritten = std::fs::read_to_string(&cred_path).unwrap();
    assert!(rewritten.contains("new-access-token"));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&cred_path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    unsafe {
        std::env::remove_var("HELIX_CLAUDE_CODE_TOKEN_URL");
    }
}

#[tokio::test]
async fn refresh_denied_on_401_falls_back_to_other_auth() {
    let tmp = tempfile::tempdir().unwrap();
    let home = tmp.path();
    let claude_dir = home.join(".claude");
    std::fs::create_dir_all(&claude_dir).unwrap();
    let cred_path = claude_dir.join(".credentials.json");

    // Already expired, so failure must surface as CredentialExpired rather
    // than silently serving the stale token.
    let expires_at = chrono::Utc::now() - chrono::Duration::minutes(1);
    let initial = serde_json::json!({
        "claudeAiOauth": {
            "accessToken": "old-access-token",
            "refreshToken": "a-refresh-token",
            "expiresAt": expires_at.timestamp_millis(),
            "scopes": [],
        }
    });
    std::fs::write(&cred_path, serde_json::to_vec(&initial).unwrap()).unwrap();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/oauth/token"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    unsafe {
        std::env::set_var("HOME", home);
        std::env::set_var("HELIX_CLAUDE_CODE_TOKEN_URL", format!("{}/v1/oauth/token", server.uri()));
    }

    let source: Arc<dyn helix_auth::CredentialSource> = Arc::new(ClaudeCodeSource::new());
    let store = CredentialStore::new(vec![source], helix_telemetry::MetricsRegistry::new());

    let err = store.token("claude-code").await.unwrap_err();
    assert!(matches!(err, helix_core::HelixError::RefreshDenied { .. } | helix_core::HelixError::CredentialExpired { .. }));

    unsafe {
        std::env::remove_var("HELIX_CLAUDE_CODE_TOKEN_URL");
    }
}
