//! The frame catalog of the data-stream protocol.
//!
//! Every frame renders to a single line `{tag}:{json}\n`, where `json` is the
//! compact JSON encoding of the frame payload. Text and error frames carry a
//! bare JSON string, data and annotation frames a bare JSON array, and every
//! other frame a JSON object.

use crate::error::ProtocolError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// The fixed set of frame kinds and their tag characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// `0`: literal text chunk.
    Text,
    /// `2`: generic structured data chunk.
    Data,
    /// `8`: message-level annotation.
    MessageAnnotation,
    /// `3`: error message.
    Error,
    /// `b`: a streaming tool call started.
    ToolCallStreamingStart,
    /// `c`: incremental tool call argument text.
    ToolCallDelta,
    /// `9`: a complete tool call.
    ToolCall,
    /// `a`: a tool execution result.
    ToolResult,
    /// `f`: a step started.
    StartStep,
    /// `e`: a step finished.
    FinishStep,
    /// `d`: the message finished.
    FinishMessage,
}

impl FrameKind {
    /// Every frame kind, in catalog order.
    pub const ALL: [FrameKind; 11] = [
        FrameKind::Text,
        FrameKind::Data,
        FrameKind::MessageAnnotation,
        FrameKind::Error,
        FrameKind::ToolCallStreamingStart,
        FrameKind::ToolCallDelta,
        FrameKind::ToolCall,
        FrameKind::ToolResult,
        FrameKind::StartStep,
        FrameKind::FinishStep,
        FrameKind::FinishMessage,
    ];

    /// The one-character discriminator written before the `:`.
    pub const fn tag(self) -> char {
        match self {
            FrameKind::Text => '0',
            FrameKind::Data => '2',
            FrameKind::MessageAnnotation => '8',
            FrameKind::Error => '3',
            FrameKind::ToolCallStreamingStart => 'b',
            FrameKind::ToolCallDelta => 'c',
            FrameKind::ToolCall => '9',
            FrameKind::ToolResult => 'a',
            FrameKind::StartStep => 'f',
            FrameKind::FinishStep => 'e',
            FrameKind::FinishMessage => 'd',
        }
    }

    /// The protocol name of the frame, e.g. `ToolCallPart`.
    pub const fn name(self) -> &'static str {
        match self {
            FrameKind::Text => "TextPart",
            FrameKind::Data => "DataPart",
            FrameKind::MessageAnnotation => "MessageAnnotationPart",
            FrameKind::Error => "ErrorPart",
            FrameKind::ToolCallStreamingStart => "ToolCallStreamingStartPart",
            FrameKind::ToolCallDelta => "ToolCallDeltaPart",
            FrameKind::ToolCall => "ToolCallPart",
            FrameKind::ToolResult => "ToolResultPart",
            FrameKind::StartStep => "StartStepPart",
            FrameKind::FinishStep => "FinishStepPart",
            FrameKind::FinishMessage => "FinishMessagePart",
        }
    }

    /// Looks a kind up by its tag character.
    pub fn from_tag(tag: char) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a model turn or message ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    /// The model reached a natural stopping point.
    Stop,
    /// The token limit was reached.
    Length,
    /// Output was withheld by a content filter.
    ContentFilter,
    /// The model requested tool calls.
    ToolCalls,
    /// The model run failed.
    Error,
    /// Any other provider-specific reason.
    Other,
    /// No reason was reported.
    Unknown,
}

impl FinishReason {
    /// The protocol spelling of the reason.
    pub const fn as_str(self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ContentFilter => "content-filter",
            FinishReason::ToolCalls => "tool-calls",
            FinishReason::Error => "error",
            FinishReason::Other => "other",
            FinishReason::Unknown => "unknown",
        }
    }

    /// Maps a provider's finish reason onto the protocol enumeration.
    ///
    /// Accepts both the protocol spellings and the snake_case spellings used
    /// by OpenAI-compatible providers. Unrecognized reasons become
    /// [`FinishReason::Other`].
    pub fn normalize(raw: &str) -> Self {
        match raw {
            "stop" => FinishReason::Stop,
            "length" => FinishReason::Length,
            "content-filter" | "content_filter" => FinishReason::ContentFilter,
            "tool-calls" | "tool_calls" | "function_call" => FinishReason::ToolCalls,
            "error" => FinishReason::Error,
            "unknown" => FinishReason::Unknown,
            _ => FinishReason::Other,
        }
    }
}

impl FromStr for FinishReason {
    type Err = ProtocolError;

    /// Strict parse: only the seven protocol spellings are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(Value::String(s.to_string())).map_err(|_| {
            ProtocolError::SchemaViolation {
                frame: "finishReason",
                reason: format!("'{s}' is not a valid finish reason"),
            }
        })
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token usage attached to finish frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    /// Tokens consumed by the prompt.
    pub prompt_tokens: u64,
    /// Tokens produced by the model.
    pub completion_tokens: u64,
}

impl Usage {
    /// Creates a usage record.
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }
}

/// Payload of a `b` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallStartPayload {
    /// Id of the call.
    pub tool_call_id: String,
    /// Tool being called.
    pub tool_name: String,
}

/// Payload of a `c` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallDeltaPayload {
    /// Id of the call.
    pub tool_call_id: String,
    /// Argument text appended to the call.
    pub args_text_delta: String,
}

/// Payload of a `9` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallPayload {
    /// Id of the call.
    pub tool_call_id: String,
    /// Tool being called.
    pub tool_name: String,
    /// Parsed arguments; always a JSON object.
    pub args: Value,
}

/// Payload of an `a` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultPayload {
    /// Id of the call answered.
    pub tool_call_id: String,
    /// The tool's output.
    pub result: Value,
}

/// Payload of an `f` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartStepPayload {
    /// Step id, unique within the message.
    pub id: String,
}

/// Payload of an `e` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishStepPayload {
    /// Why the step ended.
    pub finish_reason: FinishReason,
    /// Usage so far.
    pub usage: Usage,
    /// Another step follows in the same message.
    pub is_continued: bool,
}

/// Payload of a `d` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishMessagePayload {
    /// Why the message ended.
    pub finish_reason: FinishReason,
    /// Usage for the whole message.
    pub usage: Usage,
}

/// One unit of wire output.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// `0:"text"`
    Text(String),
    /// `2:[{...}]`
    Data(Vec<Value>),
    /// `8:[{...}]`
    MessageAnnotation(Vec<Value>),
    /// `3:"message"`
    Error(String),
    /// `b:{"toolCallId","toolName"}`
    ToolCallStreamingStart(ToolCallStartPayload),
    /// `c:{"toolCallId","argsTextDelta"}`
    ToolCallDelta(ToolCallDeltaPayload),
    /// `9:{"toolCallId","toolName","args"}`
    ToolCall(ToolCallPayload),
    /// `a:{"toolCallId","result"}`
    ToolResult(ToolResultPayload),
    /// `f:{"id"}`
    StartStep(StartStepPayload),
    /// `e:{"finishReason","usage","isContinued"}`
    FinishStep(FinishStepPayload),
    /// `d:{"finishReason","usage"}`
    FinishMessage(FinishMessagePayload),
}

impl Frame {
    /// A `0` frame.
    pub fn text(text: impl Into<String>) -> Self {
        Frame::Text(text.into())
    }

    /// A `3` frame.
    pub fn error(message: impl Into<String>) -> Self {
        Frame::Error(message.into())
    }

    /// A `b` frame.
    pub fn tool_call_start(tool_call_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Frame::ToolCallStreamingStart(ToolCallStartPayload {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
        })
    }

    /// A `c` frame.
    pub fn tool_call_delta(
        tool_call_id: impl Into<String>,
        args_text_delta: impl Into<String>,
    ) -> Self {
        Frame::ToolCallDelta(ToolCallDeltaPayload {
            tool_call_id: tool_call_id.into(),
            args_text_delta: args_text_delta.into(),
        })
    }

    /// A `9` frame.
    pub fn tool_call(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        args: Value,
    ) -> Self {
        Frame::ToolCall(ToolCallPayload {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            args,
        })
    }

    /// An `a` frame.
    pub fn tool_result(tool_call_id: impl Into<String>, result: Value) -> Self {
        Frame::ToolResult(ToolResultPayload {
            tool_call_id: tool_call_id.into(),
            result,
        })
    }

    /// An `f` frame.
    pub fn start_step(id: impl Into<String>) -> Self {
        Frame::StartStep(StartStepPayload { id: id.into() })
    }

    /// An `e` frame.
    pub fn finish_step(finish_reason: FinishReason, usage: Usage, is_continued: bool) -> Self {
        Frame::FinishStep(FinishStepPayload {
            finish_reason,
            usage,
            is_continued,
        })
    }

    /// A `d` frame.
    pub fn finish_message(finish_reason: FinishReason, usage: Usage) -> Self {
        Frame::FinishMessage(FinishMessagePayload {
            finish_reason,
            usage,
        })
    }

    /// The kind of this frame.
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Text(_) => FrameKind::Text,
            Frame::Data(_) => FrameKind::Data,
            Frame::MessageAnnotation(_) => FrameKind::MessageAnnotation,
            Frame::Error(_) => FrameKind::Error,
            Frame::ToolCallStreamingStart(_) => FrameKind::ToolCallStreamingStart,
            Frame::ToolCallDelta(_) => FrameKind::ToolCallDelta,
            Frame::ToolCall(_) => FrameKind::ToolCall,
            Frame::ToolResult(_) => FrameKind::ToolResult,
            Frame::StartStep(_) => FrameKind::StartStep,
            Frame::FinishStep(_) => FrameKind::FinishStep,
            Frame::FinishMessage(_) => FrameKind::FinishMessage,
        }
    }

    /// Builds a frame of `kind` from its JSON payload, validating it against
    /// the kind's schema.
    ///
    /// `fields` has the shape the payload takes on the wire: a string for
    /// text and error frames, an array for data and annotation frames, and an
    /// object for everything else.
    pub fn from_fields(kind: FrameKind, fields: &Value) -> Result<Self, ProtocolError> {
        let frame = match kind {
            FrameKind::Text => Frame::Text(parse(kind, fields)?),
            FrameKind::Data => Frame::Data(parse(kind, fields)?),
            FrameKind::MessageAnnotation => Frame::MessageAnnotation(parse(kind, fields)?),
            FrameKind::Error => Frame::Error(parse(kind, fields)?),
            FrameKind::ToolCallStreamingStart => {
                Frame::ToolCallStreamingStart(parse(kind, fields)?)
            }
            FrameKind::ToolCallDelta => Frame::ToolCallDelta(parse(kind, fields)?),
            FrameKind::ToolCall => Frame::ToolCall(parse(kind, fields)?),
            FrameKind::ToolResult => Frame::ToolResult(parse(kind, fields)?),
            FrameKind::StartStep => Frame::StartStep(parse(kind, fields)?),
            FrameKind::FinishStep => Frame::FinishStep(parse(kind, fields)?),
            FrameKind::FinishMessage => Frame::FinishMessage(parse(kind, fields)?),
        };
        frame.validate()?;
        Ok(frame)
    }

    /// Checks the constraints the type system does not already enforce.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        let kind = self.kind();
        match self {
            Frame::Data(items) | Frame::MessageAnnotation(items) => {
                if let Some(pos) = items.iter().position(|item| !item.is_object()) {
                    return Err(violation(kind, format!("element {pos} is not a JSON object")));
                }
            }
            Frame::ToolCallStreamingStart(p) => {
                require(kind, "toolCallId", &p.tool_call_id)?;
                require(kind, "toolName", &p.tool_name)?;
            }
            Frame::ToolCallDelta(p) => require(kind, "toolCallId", &p.tool_call_id)?,
            Frame::ToolCall(p) => {
                require(kind, "toolCallId", &p.tool_call_id)?;
                require(kind, "toolName", &p.tool_name)?;
                if !p.args.is_object() {
                    return Err(violation(kind, "args must be a JSON object"));
                }
            }
            Frame::ToolResult(p) => require(kind, "toolCallId", &p.tool_call_id)?,
            Frame::StartStep(p) => require(kind, "id", &p.id)?,
            Frame::Text(_) | Frame::Error(_) | Frame::FinishStep(_) | Frame::FinishMessage(_) => {}
        }
        Ok(())
    }

    /// Renders the frame as one protocol line, terminated by `\n`.
    pub fn render(&self) -> Result<String, ProtocolError> {
        self.validate()?;
        let kind = self.kind();
        let json = match self {
            Frame::Text(s) | Frame::Error(s) => serde_json::to_string(s),
            Frame::Data(items) | Frame::MessageAnnotation(items) => serde_json::to_string(items),
            Frame::ToolCallStreamingStart(p) => serde_json::to_string(p),
            Frame::ToolCallDelta(p) => serde_json::to_string(p),
            Frame::ToolCall(p) => serde_json::to_string(p),
            Frame::ToolResult(p) => serde_json::to_string(p),
            Frame::StartStep(p) => serde_json::to_string(p),
            Frame::FinishStep(p) => serde_json::to_string(p),
            Frame::FinishMessage(p) => serde_json::to_string(p),
        }
        .map_err(|e| violation(kind, e.to_string()))?;
        Ok(format!("{}:{}\n", kind.tag(), json))
    }

    /// Renders an error frame. Unlike [`Frame::render`] this cannot fail.
    pub fn error_line(message: &str) -> String {
        format!("{}:{}\n", FrameKind::Error.tag(), Value::String(message.to_string()))
    }
}

fn parse<T: DeserializeOwned>(kind: FrameKind, fields: &Value) -> Result<T, ProtocolError> {
    T::deserialize(fields).map_err(|e| violation(kind, e.to_string()))
}

fn require(kind: FrameKind, field: &str, value: &str) -> Result<(), ProtocolError> {
    if value.is_empty() {
        Err(violation(kind, format!("{field} must not be empty")))
    } else {
        Ok(())
    }
}

fn violation(kind: FrameKind, reason: impl Into<String>) -> ProtocolError {
    ProtocolError::SchemaViolation {
        frame: kind.name(),
        reason: reason.into(),
    }
}
