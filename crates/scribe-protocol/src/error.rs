use scribe_core::ScribeError;
use thiserror::Error;

/// Errors raised while building or sequencing wire frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A frame payload failed its schema before rendering.
    #[error("schema violation in {frame}: {reason}")]
    SchemaViolation {
        /// Name of the frame kind, e.g. `FinishMessagePart`.
        frame: &'static str,
        /// What was wrong with the payload.
        reason: String,
    },

    /// An event arrived out of the order the protocol assumes.
    #[error("protocol order violation: {0}")]
    ProtocolOrderViolation(String),

    /// The per-request ceiling on open tool calls was reached.
    #[error("too many open tool calls (limit {limit})")]
    TooManyOpenToolCalls {
        /// The configured ceiling.
        limit: usize,
    },

    /// Accumulated tool-call arguments were not a JSON object.
    #[error("invalid arguments for tool call {tool_call_id}: {reason}")]
    InvalidToolArgs {
        /// The offending call.
        tool_call_id: String,
        /// Parser message.
        reason: String,
    },
}

impl From<ProtocolError> for ScribeError {
    fn from(err: ProtocolError) -> Self {
        ScribeError::Protocol(err.to_string())
    }
}
