//! OpenRouter client tests against a mocked endpoint.
//!
//! Verify attribution headers, request payload shapes, streaming and
//! error mapping without a live API key.

use futures::StreamExt;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use errata_core::{CompletionBackend, CompletionOptions, Error, PromptMessage};
use errata_inference::openrouter::{OpenRouterClient, OpenRouterConfig, StreamingCompletion};

fn client_for(server: &MockServer, key: &str) -> OpenRouterClient {
    OpenRouterClient::new(OpenRouterConfig {
        base_url: server.uri(),
        api_key: key.to_string(),
        ..Default::default()
    })
    .expect("Failed to create client")
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "gen-123",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    })
}

#[tokio::test]
async fn test_chat_completion_sends_attribution_headers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer server-key"))
        .and(header("HTTP-Referer", "https://error-notebook.local"))
        .and(header("X-Title", "Digital Error Notebook"))
        .and(header("Content-Type", "application/json"))
        .and(body_partial_json(json!({
            "model": "openai/gpt-5-nano",
            "temperature": 0.7,
            "max_tokens": 4096,
            "messages": [{"role": "user", "content": "hello"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Hi there")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server, "server-key");
    let reply = client
        .chat_completion(
            &[PromptMessage::user("hello")],
            "openai/gpt-5-nano",
            CompletionOptions::chat(),
        )
        .await
        .expect("Request should succeed");

    assert_eq!(reply, "Hi there");
}

#[tokio::test]
async fn test_user_key_replaces_server_key() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer sk-or-user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server, "server-key").with_api_key("sk-or-user");
    let reply = client
        .chat_completion(&[PromptMessage::user("x")], "m", CompletionOptions::chat())
        .await
        .unwrap();
    assert_eq!(reply, "ok");
}

#[tokio::test]
async fn test_vision_completion_sends_text_then_images() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "model": "qwen/qwen3.5-397b-a17b",
            "max_tokens": 8192,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": "find mistakes"},
                    {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAA"}},
                    {"type": "image_url", "image_url": {"url": "data:image/png;base64,BBB"}}
                ]
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("{\"mistakes\": []}")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server, "k");
    let reply = client
        .vision_completion(
            &["AAA".to_string(), "BBB".to_string()],
            "find mistakes",
            "qwen/qwen3.5-397b-a17b",
            CompletionOptions::vision(),
        )
        .await
        .unwrap();
    assert_eq!(reply, "{\"mistakes\": []}");
}

#[tokio::test]
async fn test_error_message_is_surfaced() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"message": "Rate limit exceeded: free-models-per-day", "code": 429}
        })))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server, "k");
    let err = client
        .chat_completion(&[PromptMessage::user("x")], "m", CompletionOptions::chat())
        .await
        .unwrap_err();

    match err {
        Error::Inference(msg) => {
            assert!(msg.contains("429"), "{}", msg);
            assert!(msg.contains("free-models-per-day"), "{}", msg);
        }
        other => panic!("Expected Inference error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_plain_text_error_body_is_surfaced() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(502).set_body_string("upstream unavailable"))
        .mount(&mock_server)
        .await;

    let err = client_for(&mock_server, "k")
        .chat_completion(&[PromptMessage::user("x")], "m", CompletionOptions::chat())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Server error: upstream unavailable"));
}

#[tokio::test]
async fn test_streaming_yields_deltas_until_done() {
    let mock_server = MockServer::start().await;

    let sse = concat!(
        ": OPENROUTER PROCESSING\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Force \"}}]}\n\n",
        "data: {broken\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"equals mass\"}}]}\n\n",
        "data: [DONE]\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"after done\"}}]}\n\n",
    );

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let stream = client_for(&mock_server, "k")
        .chat_completion_stream(&[PromptMessage::user("F=?")], "m", CompletionOptions::chat())
        .await
        .unwrap();
    let tokens: Vec<String> = stream.map(|t| t.unwrap()).collect().await;

    assert_eq!(tokens, vec!["Force ".to_string(), "equals mass".to_string()]);
}

#[tokio::test]
async fn test_streaming_http_error_fails_before_stream() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "No auth credentials found", "code": 401}
        })))
        .mount(&mock_server)
        .await;

    let result = client_for(&mock_server, "")
        .chat_completion_stream(&[PromptMessage::user("x")], "m", CompletionOptions::chat())
        .await;
    match result {
        Err(e) => assert!(e.to_string().contains("Authentication failed")),
        Ok(_) => panic!("Expected an error"),
    }
}
