//! The research agent behind Scribe.
//!
//! [`ResearchGraph`] plans search subjects for a topic, searches the web for
//! each, and streams a report written by a chat model that may call tools.
//! Every model chunk and tool result is surfaced as an
//! [`AgentEvent`](scribe_protocol::AgentEvent) tagged with the node that
//! produced it.

/// Chat model backends.
pub mod backends;
/// Model and search settings.
pub mod config;
/// The research graph.
pub mod graph;
/// The chat model seam.
pub mod llm;
/// Prompt templates.
pub mod prompts;
/// Retry policy for upstream requests.
pub mod retry;
/// Web search.
pub mod search;
/// Tools the reporter can call.
pub mod tools;

pub use backends::openai::{OpenAiChatModel, SseDecoder};
pub use config::{LlmProvider, ModelConfig, SearchConfig};
pub use graph::{
    parse_subjects, AgentGraph, GraphInput, GraphSettings, ResearchGraph, TopicError,
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_MAX_TOPIC_CHARS, PLANNER, REPORTER, WEB_SEARCH,
};
pub use llm::{chat_model, ChatModel, ChatRequest, ChunkStream, ToolSpec};
pub use prompts::Prompts;
pub use retry::RetryPolicy;
pub use search::{DuckDuckGoSearch, SearchHit, SearchProvider, SubjectResults};
pub use tools::{BarChartTool, Tool, ToolRegistry, BAR_CHART_TOOL};
