//! The data-stream wire protocol and the translator that produces it.
//!
//! An agent run yields an [`EventStream`] of model chunks and tool results
//! from several graph nodes. [`StreamTranslator`] filters those events by
//! node, reassembles streamed tool calls, and renders everything as
//! newline-delimited [`Frame`] lines a browser client can parse as they
//! arrive.
//!
//! # Main types
//!
//! - [`Frame`] / [`FrameKind`]: the frame catalog and its renderer.
//! - [`ToolCallCorrelator`]: tool-call fragment reassembly and FIFO result pairing.
//! - [`EventClassifier`]: maps one agent event to zero or more frames.
//! - [`StreamTranslator`]: the per-request producer of protocol lines.
//! - [`UsageMeter`]: where finish-frame token counts come from.

/// Classification of agent events into frames.
pub mod classifier;
/// Tool-call fragment reassembly.
pub mod correlator;
/// Protocol error type.
pub mod error;
/// Agent event model.
pub mod event;
/// The frame catalog.
pub mod frame;
/// The per-request translator.
pub mod translator;
/// Token usage sources.
pub mod usage;

pub use classifier::{ClassifierOptions, EventClassifier, FatalError, TranslationState};
pub use correlator::{
    FinalizedCall, FragmentOutcome, MatchedResult, PendingToolCall, ToolArgs, ToolCallCorrelator,
};
pub use error::ProtocolError;
pub use event::{
    AgentEvent, AgentMessage, EventMetadata, EventStream, FunctionDelta, MessageChunk, ToolCallChunk,
    ToolMessage, UsageMetadata,
};
pub use frame::{FinishReason, Frame, FrameKind, Usage};
pub use translator::{StreamTranslator, TranslatorConfig, TranslatorPhase};
pub use usage::{PlaceholderUsage, ReportedUsage, UsageMeter, UsageSource};

/// Response header announcing the data-stream protocol.
pub const DATA_STREAM_HEADER: &str = "x-vercel-ai-data-stream";

/// Protocol version sent in [`DATA_STREAM_HEADER`].
pub const DATA_STREAM_VERSION: &str = "v1";
