#![allow(clippy::unwrap_used, clippy::expect_used)]

use futures_util::StreamExt;
use scribe_core::{Message, ScribeError};
use scribe_graph::*;
use scribe_protocol::MessageChunk;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn model_for(server: &MockServer) -> OpenAiChatModel {
    OpenAiChatModel::new(ModelConfig {
        api_key: "sk-test".into(),
        api_base_url: Some(server.uri()),
        ..ModelConfig::default()
    })
}

fn sse(events: &[&str]) -> String {
    events
        .iter()
        .map(|event| format!("data: {event}\n\n"))
        .collect()
}

// ---------------------------------------------------------------------------
// OpenAI-compatible chat model
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_openai_stream_yields_chunks_with_usage() {
    let server = MockServer::start().await;
    let body = sse(&[
        r#"{"choices":[{"index":0,"delta":{"role":"assistant","content":""},"finish_reason":null}],"usage":null}"#,
        r#"{"choices":[{"index":0,"delta":{"content":"Hi"},"finish_reason":null}],"usage":null}"#,
        r#"{"choices":[{"index":0,"delta":{},"finish_reason":"stop"}],"usage":null}"#,
        r#"{"choices":[],"usage":{"prompt_tokens":5,"completion_tokens":7,"total_tokens":12}}"#,
        "[DONE]",
    ]);
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(serde_json::json!({
            "stream": true,
            "stream_options": {"include_usage": true}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let request = ChatRequest::new(vec![Message::user("hello")]);
    let chunks: Vec<MessageChunk> = model_for(&server)
        .stream(&request)
        .await
        .unwrap()
        .map(Result::unwrap)
        .collect()
        .await;

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].content, "Hi");
    assert_eq!(chunks[1].finish_reason(), Some("stop"));
    let usage = chunks[1].usage_metadata.unwrap();
    assert_eq!((usage.input_tokens, usage.output_tokens), (5, 7));
}

#[tokio::test]
async fn test_openai_error_status_is_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let err = match model_for(&server).stream(&ChatRequest::default()).await {
        Ok(_) => panic!("expected an error"),
        Err(e) => e,
    };
    assert!(matches!(&err, ScribeError::Http(msg) if msg.contains("503") && msg.contains("overloaded")));
    assert!(retry::is_retryable(&err));
}

// ---------------------------------------------------------------------------
// DuckDuckGo search
// ---------------------------------------------------------------------------

fn search_for(server: &MockServer) -> DuckDuckGoSearch {
    DuckDuckGoSearch::new(&SearchConfig {
        api_base_url: Some(server.uri()),
        num_results: 2,
    })
}

#[tokio::test]
async fn test_duckduckgo_returns_limited_hits() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(query_param("q", "rust lang"))
        .and(query_param("format", "json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Heading": "Rust",
            "AbstractText": "A language.",
            "AbstractURL": "https://rust-lang.org",
            "RelatedTopics": [
                {"Text": "Cargo - build tool", "FirstURL": "https://duckduckgo.com/Cargo"},
                {"Text": "Clippy - linter", "FirstURL": "https://duckduckgo.com/Clippy"}
            ]
        })))
        .mount(&server)
        .await;

    let hits = search_for(&server).search("rust lang").await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].link, "https://rust-lang.org");
    assert_eq!(hits[1].title, "Cargo");
}

#[tokio::test]
async fn test_duckduckgo_throttling_is_search_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let err = search_for(&server).search("anything").await.unwrap_err();
    assert!(matches!(err, ScribeError::Search(msg) if msg.contains("rate limited")));
}
