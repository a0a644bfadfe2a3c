use helix_core::provider::ProviderAdapter;
use helix_core::ChatRequest;
use helix_provider::{CredentialSource, OpenAiCompatibleAdapter};
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request() -> ChatRequest {
    ChatRequest {
        model: "gpt-test".into(),
        messages: vec![helix_core::ChatMessage::user("ping")],
        temperature: None,
        top_p: None,
        max_tokens: None,
        stream: false,
        response_format: None,
        tools: None,
    }
}

#[tokio::test]
async fn successful_completion_translates_usage_and_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"content": "pong"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5},
        })))
        .mount(&server)
        .await;

    let adapter = OpenAiCompatibleAdapter::new("p1", server.uri(), CredentialSource::ApiKey("test-key".into()));
    let resp = adapter.complete(&request(), Duration::from_secs(5)).await.unwrap();
    assert_eq!(resp.content, "pong");
    assert_eq!(resp.usage.total_tokens, 5);
}

#[tokio::test]
async fn rate_limit_maps_to_throttled() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let adapter = OpenAiCompatibleAdapter::new("p1", server.uri(), CredentialSource::Anonymous);
    let err = adapter.complete(&request(), Duration::from_secs(5)).await.unwrap_err();
    assert!(matches!(err, helix_core::HelixError::Throttled(_)));
}

#[tokio::test]
async fn server_error_is_retryable_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let adapter = OpenAiCompatibleAdapter::new("p1", server.uri(), CredentialSource::Anonymous);
    let err = adapter.complete(&request(), Duration::from_secs(5)).await.unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn unauthorised_is_not_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let adapter = OpenAiCompatibleAdapter::new("p1", server.uri(), CredentialSource::Anonymous);
    let err = adapter.complete(&request(), Duration::from_secs(5)).await.unwrap_err();
    assert!(!err.is_retryable());
    assert!(matches!(err, helix_core::HelixError::Unauthorised(_)));
}
