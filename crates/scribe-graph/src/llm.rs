use crate::backends::openai::OpenAiChatModel;
use crate::config::ModelConfig;
use async_trait::async_trait;
use futures_util::Stream;
use scribe_core::{Message, ScribeResult};
use scribe_protocol::MessageChunk;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;

/// Chunks of one streamed model turn, in arrival order.
pub type ChunkStream = Pin<Box<dyn Stream<Item = ScribeResult<MessageChunk>> + Send>>;

/// A function the model may call, described in JSON Schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Name the model calls the tool by.
    pub name: String,
    /// What the tool does, for the model.
    pub description: String,
    /// JSON Schema of the arguments object.
    pub parameters_schema: serde_json::Value,
}

/// One model turn's input.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// Conversation so far.
    pub messages: Vec<Message>,
    /// Tools the model may call.
    pub tools: Vec<ToolSpec>,
    /// Ask the model for a single JSON object.
    pub json_mode: bool,
}

impl ChatRequest {
    /// A plain text request.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    /// Offers `tools` to the model.
    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    /// Switches on JSON mode.
    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

/// A streaming chat model.
///
/// `stream` resolves once the provider has accepted the request; failures
/// after that arrive as `Err` items on the returned stream. Dropping the
/// stream abandons the request.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Starts one turn.
    async fn stream(&self, request: &ChatRequest) -> ScribeResult<ChunkStream>;
}

/// Builds the chat model a [`ModelConfig`] describes.
pub fn chat_model(config: ModelConfig) -> Arc<dyn ChatModel> {
    Arc::new(OpenAiChatModel::new(config))
}
