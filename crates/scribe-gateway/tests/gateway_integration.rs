#![allow(clippy::unwrap_used, clippy::expect_used)]

use futures_util::stream;
use scribe_core::{ScribeError, ScribeResult};
use scribe_gateway::{GatewayConfig, GatewayServer};
use scribe_graph::{AgentGraph, GraphInput, PLANNER, REPORTER};
use scribe_protocol::{AgentEvent, EventStream, MessageChunk, TranslatorConfig};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// Replays a fixed event list for every run and records the inputs it saw.
struct FakeGraph {
    events: Vec<Result<AgentEvent, &'static str>>,
    inputs: Mutex<Vec<GraphInput>>,
}

impl FakeGraph {
    fn new(events: Vec<Result<AgentEvent, &'static str>>) -> Arc<Self> {
        Arc::new(Self {
            events,
            inputs: Mutex::new(Vec::new()),
        })
    }
}

impl AgentGraph for FakeGraph {
    fn nodes(&self) -> &[&'static str] {
        &[PLANNER, REPORTER]
    }

    fn stream(&self, input: GraphInput) -> EventStream {
        self.inputs.lock().unwrap().push(input);
        let events: Vec<ScribeResult<AgentEvent>> = self
            .events
            .iter()
            .map(|event| match event {
                Ok(event) => Ok(event.clone()),
                Err(msg) => Err(ScribeError::Agent(msg.to_string())),
            })
            .collect();
        Box::pin(stream::iter(events))
    }
}

fn hi_run() -> Vec<Result<AgentEvent, &'static str>> {
    vec![
        Ok(AgentEvent::chunk(PLANNER, MessageChunk::text("{\"subjects\":[]}"))),
        Ok(AgentEvent::chunk(REPORTER, MessageChunk::text("Hi"))),
        Ok(AgentEvent::chunk(
            REPORTER,
            MessageChunk::default().with_finish_reason("stop"),
        )),
    ]
}

/// Helper: serve `graph` on a random port, returning the base URL.
async fn start_test_server(graph: Arc<FakeGraph>) -> String {
    let app = GatewayServer::build(graph, GatewayConfig::default()).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://127.0.0.1:{}", addr.port())
}

async fn post_chat(base: &str, body: serde_json::Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{base}/api/chat"))
        .json(&body)
        .send()
        .await
        .unwrap()
}

fn topic(content: &str) -> serde_json::Value {
    serde_json::json!({"messages": [{"role": "user", "content": content}]})
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_health_endpoint() {
    let base = start_test_server(FakeGraph::new(vec![])).await;
    let resp = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "scribe");
}

#[tokio::test]
async fn test_build_rejects_unknown_stream_node() {
    let config = GatewayConfig {
        translator: TranslatorConfig::with_stream_nodes(["writer"]),
        ..GatewayConfig::default()
    };
    let result = GatewayServer::build(FakeGraph::new(vec![]), config);
    assert!(matches!(result, Err(ScribeError::Config(_))));
}

// ---------------------------------------------------------------------------
// Streaming
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_chat_streams_protocol_lines() {
    let graph = FakeGraph::new(hi_run());
    let base = start_test_server(graph.clone()).await;

    let resp = post_chat(&base, topic("  rust  ")).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["x-vercel-ai-data-stream"], "v1");
    assert_eq!(
        resp.headers()["content-type"],
        "text/plain; charset=utf-8"
    );

    let body = resp.text().await.unwrap();
    assert_eq!(
        body,
        "0:\"Hi\"\nd:{\"finishReason\":\"stop\",\"usage\":{\"promptTokens\":0,\"completionTokens\":0}}\n"
    );
    assert_eq!(graph.inputs.lock().unwrap()[0].topic, "rust");
}

#[tokio::test]
async fn test_graph_failure_ends_with_error_frame() {
    let graph = FakeGraph::new(vec![
        Ok(AgentEvent::chunk(REPORTER, MessageChunk::text("Partial"))),
        Err("boom"),
    ]);
    let base = start_test_server(graph).await;

    let body = post_chat(&base, topic("rust")).await.text().await.unwrap();
    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(lines, vec!["0:\"Partial\"", "3:\"Agent error: boom\""]);
}

#[tokio::test]
async fn test_only_last_message_is_used() {
    let graph = FakeGraph::new(hi_run());
    let base = start_test_server(graph.clone()).await;

    let resp = post_chat(
        &base,
        serde_json::json!({"messages": [
            {"role": "user", "content": "first"},
            {"role": "assistant", "content": "answer"},
            {"role": "user", "content": "second"}
        ]}),
    )
    .await;
    assert_eq!(resp.status(), 200);
    assert_eq!(graph.inputs.lock().unwrap()[0].topic, "second");
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_empty_messages_is_bad_request() {
    let graph = FakeGraph::new(hi_run());
    let base = start_test_server(graph.clone()).await;

    let resp = post_chat(&base, serde_json::json!({"messages": []})).await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "messages must not be empty");
    assert!(graph.inputs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_blank_topic_is_bad_request() {
    let base = start_test_server(FakeGraph::new(hi_run())).await;
    let resp = post_chat(&base, topic("   ")).await;
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_long_topic_is_unprocessable() {
    let base = start_test_server(FakeGraph::new(hi_run())).await;

    let resp = post_chat(&base, topic(&"x".repeat(51))).await;
    assert_eq!(resp.status(), 422);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("51"));

    let ok = post_chat(&base, topic(&"é".repeat(50))).await;
    assert_eq!(ok.status(), 200);
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let base = start_test_server(FakeGraph::new(hi_run())).await;
    let resp = post_chat(&base, serde_json::json!({"messages": "nope"})).await;
    assert!(resp.status().is_client_error());
}

// ---------------------------------------------------------------------------
// CORS
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_cors_preflight_allows_frontend_origin() {
    let base = start_test_server(FakeGraph::new(vec![])).await;
    let resp = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, format!("{base}/api/chat"))
        .header("origin", "http://localhost:3000")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .send()
        .await
        .unwrap();

    assert!(resp.status().is_success());
    assert_eq!(
        resp.headers()["access-control-allow-origin"],
        "http://localhost:3000"
    );
    assert_eq!(resp.headers()["access-control-allow-credentials"], "true");
}

#[tokio::test]
async fn test_cors_ignores_unknown_origin() {
    let base = start_test_server(FakeGraph::new(vec![])).await;
    let resp = reqwest::Client::new()
        .get(format!("{base}/health"))
        .header("origin", "http://evil.example")
        .send()
        .await
        .unwrap();
    assert!(resp.headers().get("access-control-allow-origin").is_none());
}
