//! HTTP-level tests for `OpenAiCompatProvider::complete()` against a local
//! wiremock server.

use std::time::Duration;

use secrecy::SecretString;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use quote_inbox::error::LlmError;
use quote_inbox::llm::{ChatMessage, CompletionRequest, FinishReason, LlmProvider, OpenAiCompatProvider};

fn provider(server: &MockServer, project: Option<&str>) -> OpenAiCompatProvider {
    OpenAiCompatProvider::new(
        server.uri(),
        SecretString::from("sk-mock-key"),
        "gpt-4o-mini",
        project.map(str::to_string),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn request() -> CompletionRequest {
    CompletionRequest::new(vec![
        ChatMessage::system("Devuelve JSON"),
        ChatMessage::user("Presupuesto: 2500€"),
    ])
}

#[tokio::test]
async fn complete_parses_successful_json_answer() {
    let server = MockServer::start().await;

    let body = serde_json::json!({
        "id": "chatcmpl-001",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "{\"totalPrice\": 2500}"},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 42, "completion_tokens": 7, "total_tokens": 49}
    });

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer sk-mock-key"))
        .and(header("OpenAI-Project", "proj_bodas"))
        .and(body_partial_json(serde_json::json!({
            "model": "gpt-4o-mini",
            "response_format": {"type": "json_object"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .expect(1)
        .mount(&server)
        .await;

    let response = provider(&server, Some("proj_bodas"))
        .complete(request().with_json_output().with_temperature(0.1))
        .await
        .unwrap();

    assert_eq!(response.content, "{\"totalPrice\": 2500}");
    assert_eq!(response.input_tokens, 42);
    assert_eq!(response.output_tokens, 7);
    assert_eq!(response.finish_reason, FinishReason::Stop);
    assert_eq!(response.response_id.as_deref(), Some("chatcmpl-001"));
}

#[tokio::test]
async fn unauthorized_maps_to_auth_failed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let err = provider(&server, None).complete(request()).await.unwrap_err();
    assert!(matches!(err, LlmError::AuthFailed { .. }), "got {err:?}");
}

#[tokio::test]
async fn rate_limit_reads_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "12"))
        .mount(&server)
        .await;

    let err = provider(&server, None).complete(request()).await.unwrap_err();
    match err {
        LlmError::RateLimited { retry_after, .. } => {
            assert_eq!(retry_after, Some(Duration::from_secs(12)));
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[tokio::test]
async fn server_error_is_request_failed_with_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let err = provider(&server, None).complete(request()).await.unwrap_err();
    match err {
        LlmError::RequestFailed { reason, .. } => {
            assert!(reason.contains("500"), "reason: {reason}");
            assert!(reason.contains("upstream exploded"));
        }
        other => panic!("expected RequestFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_body_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json at all"))
        .mount(&server)
        .await;

    let err = provider(&server, None).complete(request()).await.unwrap_err();
    assert!(matches!(err, LlmError::InvalidResponse { .. }), "got {err:?}");
}

#[tokio::test]
async fn empty_choices_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
        .mount(&server)
        .await;

    let err = provider(&server, None).complete(request()).await.unwrap_err();
    assert!(matches!(err, LlmError::InvalidResponse { .. }), "got {err:?}");
}
