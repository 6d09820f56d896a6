use crate::server::AppState;
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures_util::StreamExt;
use scribe_graph::{GraphInput, TopicError};
use scribe_protocol::{StreamTranslator, DATA_STREAM_HEADER, DATA_STREAM_VERSION};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// How far a client-side tool invocation got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolInvocationState {
    /// Complete call, no result yet.
    Call,
    /// Arguments still streaming.
    PartialCall,
    /// Answered.
    Result,
}

/// A tool call the client already rendered, echoed back in history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    /// Progress of the invocation.
    pub state: ToolInvocationState,
    /// Id from the `9` frame.
    pub tool_call_id: String,
    /// Tool name from the `9` frame.
    pub tool_name: String,
    /// Arguments as the client saw them.
    #[serde(default)]
    pub args: Value,
    /// Result from the `a` frame, once there is one.
    #[serde(default)]
    pub result: Value,
}

/// A file the user attached to a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientAttachment {
    /// File name.
    pub name: String,
    /// MIME type.
    pub content_type: String,
    /// Where the content lives, often a data URL.
    pub url: String,
}

/// One entry of the chat history the client sends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMessage {
    /// `user`, `assistant` or `system`.
    pub role: String,
    /// Message text.
    pub content: String,
    /// Attachments, sent under their snake_case name.
    #[serde(default, rename = "experimental_attachments")]
    pub experimental_attachments: Option<Vec<ClientAttachment>>,
    /// Tool calls rendered on an assistant message.
    #[serde(default)]
    pub tool_invocations: Option<Vec<ToolInvocation>>,
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRequest {
    /// Chat history, oldest first.
    pub messages: Vec<ClientMessage>,
}

impl ClientRequest {
    /// The research input: the last message's content, trimmed.
    pub fn graph_input(&self, max_topic_chars: usize) -> Result<GraphInput, ChatError> {
        let last = self.messages.last().ok_or(ChatError::EmptyMessages)?;
        let input = GraphInput::new(last.content.trim());
        input.validate(max_topic_chars)?;
        Ok(input)
    }
}

/// Why a chat request was refused before streaming began.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The request had no messages.
    #[error("messages must not be empty")]
    EmptyMessages,

    /// The last message is not a usable topic.
    #[error(transparent)]
    Topic(#[from] TopicError),

    /// The response could not be built.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ChatError {
    /// The HTTP status this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            ChatError::EmptyMessages | ChatError::Topic(TopicError::Empty) => {
                StatusCode::BAD_REQUEST
            }
            ChatError::Topic(TopicError::TooLong { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            ChatError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(serde_json::json!({"error": self.to_string()}))).into_response()
    }
}

/// `POST /api/chat`: runs the graph on the last message and streams its
/// translated events back as protocol lines.
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ClientRequest>,
) -> Result<Response, ChatError> {
    let request_id = Uuid::new_v4();
    let input = request
        .graph_input(state.config.max_topic_chars)
        .inspect_err(|e| warn!(%request_id, error = %e, "Rejected chat request"))?;
    info!(
        %request_id,
        topic = %input.topic,
        history = request.messages.len(),
        "Starting chat stream"
    );

    let events = state.graph.stream(input);
    let lines = StreamTranslator::new(&state.config.translator).translate(events);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(DATA_STREAM_HEADER, DATA_STREAM_VERSION)
        .body(Body::from_stream(lines.map(Ok::<_, Infallible>)))
        .map_err(|e| ChatError::Internal(e.to_string()))
}
