use crate::chat::chat_handler;
use axum::{
    http::HeaderValue,
    routing::{get, post},
    Json, Router,
};
use scribe_core::{ScribeError, ScribeResult};
use scribe_graph::{AgentGraph, DEFAULT_MAX_TOPIC_CHARS};
use scribe_protocol::TranslatorConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Settings for the HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Browser origins allowed to call the API.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    /// Longest accepted topic, in characters.
    #[serde(default = "default_max_topic_chars")]
    pub max_topic_chars: usize,
    /// How run events become protocol lines.
    #[serde(default)]
    pub translator: TranslatorConfig,
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

fn default_max_topic_chars() -> usize {
    DEFAULT_MAX_TOPIC_CHARS
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
            max_topic_chars: default_max_topic_chars(),
            translator: TranslatorConfig::default(),
        }
    }
}

/// Shared application state.
pub struct AppState {
    /// The graph every chat request runs.
    pub graph: Arc<dyn AgentGraph>,
    /// Gateway settings.
    pub config: GatewayConfig,
}

/// The HTTP gateway.
pub struct GatewayServer;

impl GatewayServer {
    /// Builds the router serving `POST /api/chat` and `GET /health`.
    ///
    /// Fails when an allowed origin is not a valid header value, or when a
    /// streamed node is not one the graph has.
    pub fn build(graph: Arc<dyn AgentGraph>, config: GatewayConfig) -> ScribeResult<Router> {
        check_stream_nodes(graph.nodes(), &config.translator.stream_nodes)?;
        let cors = cors_layer(&config.allowed_origins)?;
        info!(
            origins = ?config.allowed_origins,
            stream_nodes = ?config.translator.stream_nodes,
            "Building gateway"
        );

        let state = Arc::new(AppState { graph, config });

        Ok(Router::new()
            .route("/api/chat", post(chat_handler))
            .route("/health", get(health_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(cors),
            ))
    }
}

fn check_stream_nodes(graph_nodes: &[&str], stream_nodes: &[String]) -> ScribeResult<()> {
    match stream_nodes
        .iter()
        .find(|node| !graph_nodes.contains(&node.as_str()))
    {
        Some(unknown) => Err(ScribeError::Config(format!(
            "stream node {unknown:?} is not a graph node (have {graph_nodes:?})"
        ))),
        None => Ok(()),
    }
}

fn cors_layer(origins: &[String]) -> ScribeResult<CorsLayer> {
    let origins = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|e| ScribeError::Config(format!("invalid CORS origin {origin:?}: {e}")))
        })
        .collect::<ScribeResult<Vec<_>>>()?;

    // Credentials rule out wildcards, so methods and headers mirror the request.
    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok", "service": "scribe"}))
}
