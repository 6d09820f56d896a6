use crate::correlator::{FragmentOutcome, ToolArgs, ToolCallCorrelator};
use crate::error::ProtocolError;
use crate::event::{AgentEvent, AgentMessage, MessageChunk, ToolMessage};
use crate::frame::{FinishReason, Frame};
use crate::usage::UsageMeter;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Optional frames and failure modes of the classifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassifierOptions {
    /// Emit `b`/`c` frames while tool-call arguments stream in.
    pub stream_tool_call_deltas: bool,
    /// Emit `f`/`e` frames around each model turn.
    pub emit_steps: bool,
    /// Treat unparsable tool-call arguments as fatal to the stream.
    pub strict_tool_args: bool,
}

/// An error that ends the stream, with the frames the same event produced
/// before it.
#[derive(Debug)]
pub struct FatalError {
    /// Frames that precede the failure, in emission order.
    pub frames: Vec<Frame>,
    /// What went wrong.
    pub error: ProtocolError,
}

/// Mutable state of one translation, handed to the classifier per event.
pub struct TranslationState {
    /// Tool calls of this translation.
    pub correlator: ToolCallCorrelator,
    /// Source of the counts on finish frames.
    pub usage: Box<dyn UsageMeter>,
    step_open: bool,
    steps_started: u64,
}

impl TranslationState {
    /// Fresh state for one translation.
    pub fn new(correlator: ToolCallCorrelator, usage: Box<dyn UsageMeter>) -> Self {
        Self {
            correlator,
            usage,
            step_open: false,
            steps_started: 0,
        }
    }
}

/// Decides which frames, if any, an agent event turns into.
#[derive(Debug, Clone)]
pub struct EventClassifier {
    stream_nodes: HashSet<String>,
    options: ClassifierOptions,
}

impl EventClassifier {
    /// A classifier surfacing events from `stream_nodes` only.
    pub fn new<I, S>(stream_nodes: I, options: ClassifierOptions) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stream_nodes: stream_nodes.into_iter().map(Into::into).collect(),
            options,
        }
    }

    /// Whether events from `node` reach the client.
    pub fn surfaces(&self, node: &str) -> bool {
        self.stream_nodes.contains(node)
    }

    /// Classifies one event, updating `state` and returning the frames to
    /// emit in order.
    ///
    /// Contained problems come back as error frames inside `Ok`. An `Err` is
    /// fatal: the caller must emit its frames, report the error and close the
    /// stream.
    pub fn classify(
        &self,
        event: &AgentEvent,
        state: &mut TranslationState,
    ) -> Result<Vec<Frame>, FatalError> {
        if !self.surfaces(event.node()) {
            return Ok(Vec::new());
        }

        match &event.message {
            AgentMessage::Chunk(chunk) => self.classify_chunk(chunk, state),
            AgentMessage::ToolResult(message) => Ok(classify_tool_result(message, state)),
        }
    }

    fn classify_chunk(
        &self,
        chunk: &MessageChunk,
        state: &mut TranslationState,
    ) -> Result<Vec<Frame>, FatalError> {
        let mut frames = Vec::new();
        state.usage.observe(chunk);

        if self.options.emit_steps && !state.step_open && !chunk.is_empty() {
            frames.push(Frame::start_step(format!("step_{}", state.steps_started)));
            state.steps_started += 1;
            state.step_open = true;
        }

        if !chunk.content.is_empty() {
            frames.push(Frame::text(chunk.content.as_str()));
        }

        // Fragments go in before the finish reason so a chunk carrying both
        // still flushes its own fragments.
        for fragment in &chunk.additional_kwargs.tool_calls {
            let delta = fragment.function.arguments.as_str();
            match state.correlator.on_fragment(
                fragment.call_id(),
                fragment.function.name.as_deref(),
                delta,
            ) {
                Ok(FragmentOutcome::Opened {
                    tool_call_id,
                    tool_name,
                }) => {
                    if self.options.stream_tool_call_deltas {
                        frames.push(Frame::tool_call_start(tool_call_id.as_str(), tool_name));
                        if !delta.is_empty() {
                            frames.push(Frame::tool_call_delta(tool_call_id, delta));
                        }
                    }
                }
                Ok(FragmentOutcome::Appended { tool_call_id }) => {
                    if self.options.stream_tool_call_deltas && !delta.is_empty() {
                        frames.push(Frame::tool_call_delta(tool_call_id, delta));
                    }
                }
                Ok(FragmentOutcome::Ignored) => {
                    debug!("Dropped fragment of a rejected tool call");
                }
                Err(e @ ProtocolError::TooManyOpenToolCalls { .. }) => {
                    warn!(error = %e, "Rejected tool call");
                    frames.push(Frame::error(e.to_string()));
                }
                Err(e) => {
                    warn!(error = %e, "Dropped tool-call fragment");
                }
            }
        }

        if let Some(raw) = chunk.finish_reason() {
            let reason = FinishReason::normalize(raw);
            if reason == FinishReason::ToolCalls {
                for call in state.correlator.flush_all() {
                    if let ToolArgs::Invalid { reason: parse_error, .. } = &call.args {
                        let err = ProtocolError::InvalidToolArgs {
                            tool_call_id: call.tool_call_id.clone(),
                            reason: parse_error.clone(),
                        };
                        if self.options.strict_tool_args {
                            return Err(FatalError { frames, error: err });
                        }
                        warn!(error = %err, "Emitting tool call with empty arguments");
                        frames.push(Frame::error(err.to_string()));
                    }
                    frames.push(Frame::tool_call(
                        call.tool_call_id.as_str(),
                        call.tool_name.as_str(),
                        call.args.to_frame_args(),
                    ));
                }
            }

            let usage = state.usage.current();
            if self.options.emit_steps {
                frames.push(Frame::finish_step(
                    reason,
                    usage,
                    reason == FinishReason::ToolCalls,
                ));
                state.step_open = false;
            }
            if reason != FinishReason::ToolCalls {
                frames.push(Frame::finish_message(reason, usage));
            }
        }

        Ok(frames)
    }
}

fn classify_tool_result(message: &ToolMessage, state: &mut TranslationState) -> Vec<Frame> {
    let Some(matched) = state.correlator.match_result(message.content.clone()) else {
        let err =
            ProtocolError::ProtocolOrderViolation("tool result with no outstanding call".to_string());
        warn!(error = %err, "Dropped tool result");
        return Vec::new();
    };
    if matched.withdrawn {
        warn!(
            tool_call_id = %matched.call.tool_call_id,
            "Dropped result of a tool call the client never received"
        );
        return Vec::new();
    }

    if let Some(claimed) = message.tool_call_id.as_deref() {
        if claimed != matched.call.tool_call_id {
            warn!(
                claimed = %claimed,
                paired = %matched.call.tool_call_id,
                "Tool result paired by arrival order with a different call"
            );
        }
    }

    vec![Frame::tool_result(matched.call.tool_call_id, matched.result)]
}
