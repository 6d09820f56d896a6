//! Events produced by the agent graph, as the translator sees them.
//!
//! The shapes mirror the graph framework's `messages` stream mode: each item
//! is a model-output chunk or a tool-result record, tagged with the name of
//! the graph node that produced it.

use futures_util::Stream;
use scribe_core::{ScribeResult, ToolResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;

/// The ordered sequence of events from one agent run.
///
/// An `Err` item means the run itself failed and no further events follow.
pub type EventStream = Pin<Box<dyn Stream<Item = ScribeResult<AgentEvent>> + Send>>;

/// One event from the agent graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEvent {
    /// What happened.
    pub message: AgentMessage,
    /// Which node it happened in.
    pub metadata: EventMetadata,
}

impl AgentEvent {
    /// A model-output chunk emitted by `node`.
    pub fn chunk(node: impl Into<String>, chunk: MessageChunk) -> Self {
        Self {
            message: AgentMessage::Chunk(chunk),
            metadata: EventMetadata::new(node),
        }
    }

    /// A tool-result record emitted by `node`.
    pub fn tool_result(node: impl Into<String>, message: ToolMessage) -> Self {
        Self {
            message: AgentMessage::ToolResult(message),
            metadata: EventMetadata::new(node),
        }
    }

    /// Name of the originating graph node.
    pub fn node(&self) -> &str {
        &self.metadata.langgraph_node
    }
}

/// Where an event came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Name of the graph node.
    pub langgraph_node: String,
}

impl EventMetadata {
    /// Metadata naming `node`.
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            langgraph_node: node.into(),
        }
    }
}

/// The payload of an [`AgentEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentMessage {
    /// Incremental model output.
    Chunk(MessageChunk),
    /// The output of an executed tool.
    #[serde(rename = "tool")]
    ToolResult(ToolMessage),
}

/// A piece of streamed model output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageChunk {
    /// Text delta; empty when the chunk carries none.
    #[serde(default)]
    pub content: String,
    /// Holds the finish reason on the chunk that ends a turn.
    #[serde(default)]
    pub response_metadata: ResponseMetadata,
    /// Holds tool-call fragments.
    #[serde(default)]
    pub additional_kwargs: AdditionalKwargs,
    /// Token counts, when the provider reports them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,
}

impl MessageChunk {
    /// A chunk carrying only text.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Sets the finish reason.
    pub fn with_finish_reason(mut self, reason: impl Into<String>) -> Self {
        self.response_metadata.finish_reason = Some(reason.into());
        self
    }

    /// Appends a tool-call fragment.
    pub fn with_tool_call(mut self, fragment: ToolCallChunk) -> Self {
        self.additional_kwargs.tool_calls.push(fragment);
        self
    }

    /// Attaches reported token counts.
    pub fn with_usage(mut self, input_tokens: u64, output_tokens: u64) -> Self {
        self.usage_metadata = Some(UsageMetadata {
            input_tokens,
            output_tokens,
        });
        self
    }

    /// The provider's finish reason, if this chunk ends a model turn.
    pub fn finish_reason(&self) -> Option<&str> {
        self.response_metadata
            .finish_reason
            .as_deref()
            .filter(|reason| !reason.is_empty())
    }

    /// True when the chunk carries nothing the translator acts on.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
            && self.finish_reason().is_none()
            && self.additional_kwargs.tool_calls.is_empty()
    }
}

/// Provider metadata of a chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// Raw finish reason, e.g. `stop` or `tool_calls`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Provider-specific extras of a chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdditionalKwargs {
    /// Tool-call fragments, in arrival order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallChunk>,
}

/// Token counts reported in-band by the model provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetadata {
    /// Prompt tokens.
    pub input_tokens: u64,
    /// Generated tokens.
    pub output_tokens: u64,
}

/// A fragment of a streamed tool call.
///
/// A fragment with an `id` starts (or continues) that call; a fragment
/// without one continues the most recently started call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallChunk {
    /// Provider slot of the call within the turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    /// Call id; absent on continuations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Name and argument text.
    #[serde(default)]
    pub function: FunctionDelta,
}

impl ToolCallChunk {
    /// The first fragment of call `id`.
    pub fn start(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            index: None,
            id: Some(id.into()),
            function: FunctionDelta {
                name: Some(name.into()),
                arguments: arguments.into(),
            },
        }
    }

    /// A continuation fragment carrying more argument text.
    pub fn continuation(arguments: impl Into<String>) -> Self {
        Self {
            index: None,
            id: None,
            function: FunctionDelta {
                name: None,
                arguments: arguments.into(),
            },
        }
    }

    /// The call id, treating an empty string as absent.
    pub fn call_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }
}

/// The function part of a tool-call fragment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionDelta {
    /// Tool name; usually only on the first fragment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Argument text delta.
    #[serde(default)]
    pub arguments: String,
}

/// The result of one tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolMessage {
    /// The call this result claims to answer. Pairing is FIFO regardless.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Name of the tool that ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The tool's output.
    pub content: Value,
}

impl ToolMessage {
    /// A result with no claimed call id.
    pub fn new(content: impl Into<Value>) -> Self {
        Self {
            tool_call_id: None,
            name: None,
            content: content.into(),
        }
    }

    /// Claims the call this result answers.
    pub fn for_call(mut self, tool_call_id: impl Into<String>) -> Self {
        self.tool_call_id = Some(tool_call_id.into());
        self
    }
}

impl From<ToolResult> for ToolMessage {
    /// The record of an executed call; errors keep their reason as content.
    fn from(result: ToolResult) -> Self {
        ToolMessage::new(result.output).for_call(result.call_id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_message_from_result() {
        let message = ToolMessage::from(ToolResult::success("c1", serde_json::json!({"ok": true})));
        assert_eq!(message.tool_call_id.as_deref(), Some("c1"));
        assert_eq!(message.content, serde_json::json!({"ok": true}));
        assert!(message.name.is_none());
    }

    #[test]
    fn test_chunk_event_from_json() {
        let event: AgentEvent = serde_json::from_str(
            r#"{
                "message": {
                    "type": "chunk",
                    "content": "",
                    "additional_kwargs": {"tool_calls": [
                        {"index": 0, "id": "call-1", "function": {"name": "search", "arguments": "{\"q\":"}}
                    ]}
                },
                "metadata": {"langgraph_node": "reporter"}
            }"#,
        )
        .unwrap();

        assert_eq!(event.node(), "reporter");
        let AgentMessage::Chunk(chunk) = event.message else {
            panic!("expected a chunk");
        };
        assert_eq!(chunk.additional_kwargs.tool_calls[0].call_id(), Some("call-1"));
        assert_eq!(chunk.finish_reason(), None);
    }

    #[test]
    fn test_tool_event_from_json() {
        let event: AgentEvent = serde_json::from_str(
            r#"{"message": {"type": "tool", "content": "3 results"}, "metadata": {"langgraph_node": "tools"}}"#,
        )
        .unwrap();
        assert_eq!(
            event.message,
            AgentMessage::ToolResult(ToolMessage::new("3 results"))
        );
    }

    #[test]
    fn test_empty_id_is_a_continuation() {
        let mut fragment = ToolCallChunk::continuation("\"x\"}");
        fragment.id = Some(String::new());
        assert_eq!(fragment.call_id(), None);
    }

    #[test]
    fn test_empty_finish_reason_is_absent() {
        let chunk = MessageChunk::text("Hi").with_finish_reason("");
        assert_eq!(chunk.finish_reason(), None);
        assert!(!chunk.is_empty());
        assert!(MessageChunk::default().is_empty());
    }
}
