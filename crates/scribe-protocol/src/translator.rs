use crate::classifier::{ClassifierOptions, EventClassifier, FatalError, TranslationState};
use crate::correlator::{ToolCallCorrelator, DEFAULT_MAX_OPEN_TOOL_CALLS};
use crate::event::{AgentEvent, EventStream};
use crate::frame::Frame;
use crate::usage::{UsageMeter, UsageSource};
use futures_util::{stream, Stream, StreamExt};
use scribe_core::ScribeResult;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, error, info, warn};

/// Per-request translator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatorConfig {
    /// Graph nodes whose events reach the client.
    #[serde(default = "default_stream_nodes")]
    pub stream_nodes: Vec<String>,
    /// Ceiling on tool calls open at the same time.
    #[serde(default = "default_max_open_tool_calls")]
    pub max_open_tool_calls: usize,
    /// Close the stream when a flushed call's arguments are not valid JSON.
    #[serde(default)]
    pub strict_tool_args: bool,
    /// Emit `b`/`c` frames while tool-call arguments stream in.
    #[serde(default)]
    pub stream_tool_call_deltas: bool,
    /// Emit `f`/`e` frames around each model turn.
    #[serde(default)]
    pub emit_steps: bool,
    /// Where finish-frame token counts come from.
    #[serde(default)]
    pub usage: UsageSource,
}

fn default_stream_nodes() -> Vec<String> {
    vec!["reporter".to_string()]
}

fn default_max_open_tool_calls() -> usize {
    DEFAULT_MAX_OPEN_TOOL_CALLS
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            stream_nodes: default_stream_nodes(),
            max_open_tool_calls: default_max_open_tool_calls(),
            strict_tool_args: false,
            stream_tool_call_deltas: false,
            emit_steps: false,
            usage: UsageSource::default(),
        }
    }
}

impl TranslatorConfig {
    /// Default settings surfacing only `nodes`.
    pub fn with_stream_nodes<I, S>(nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stream_nodes: nodes.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    fn classifier_options(&self) -> ClassifierOptions {
        ClassifierOptions {
            stream_tool_call_deltas: self.stream_tool_call_deltas,
            emit_steps: self.emit_steps,
            strict_tool_args: self.strict_tool_args,
        }
    }
}

/// Lifecycle of a translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslatorPhase {
    /// Consuming the agent's events.
    Streaming,
    /// Terminal: the source ended or failed.
    Closed,
}

/// Turns one agent run's event stream into data-stream protocol lines.
///
/// A translator is built per request and consumed by [`StreamTranslator::translate`].
pub struct StreamTranslator {
    classifier: EventClassifier,
    state: TranslationState,
}

impl StreamTranslator {
    /// A translator for one request.
    pub fn new(config: &TranslatorConfig) -> Self {
        Self {
            classifier: EventClassifier::new(
                config.stream_nodes.iter().cloned(),
                config.classifier_options(),
            ),
            state: TranslationState::new(
                ToolCallCorrelator::new(config.max_open_tool_calls),
                config.usage.meter(),
            ),
        }
    }

    /// Replaces the usage meter, e.g. with a real accounting source.
    pub fn with_usage_meter(mut self, meter: Box<dyn UsageMeter>) -> Self {
        self.state.usage = meter;
        self
    }

    /// Lazily translates `source` into protocol lines, in event order.
    ///
    /// The returned stream ends when the source ends. A source error is
    /// reported as one final error line. Dropping the returned stream drops
    /// `source`, which cancels the agent run behind it.
    pub fn translate(self, source: EventStream) -> impl Stream<Item = String> + Send + 'static {
        let run = Run {
            translator: self,
            source,
            pending: VecDeque::new(),
            phase: TranslatorPhase::Streaming,
            events: 0,
            lines: 0,
        };

        stream::unfold(run, |mut run| async move {
            loop {
                if let Some(line) = run.pending.pop_front() {
                    run.lines += 1;
                    return Some((line, run));
                }
                if run.phase == TranslatorPhase::Closed {
                    return None;
                }
                match run.source.next().await {
                    Some(Ok(event)) => run.step(&event),
                    Some(Err(e)) => {
                        error!(error = %e, "Agent run failed");
                        run.pending.push_back(Frame::error_line(&e.to_string()));
                        run.close();
                    }
                    None => run.close(),
                }
            }
        })
    }
}

struct Run {
    translator: StreamTranslator,
    source: EventStream,
    pending: VecDeque<String>,
    phase: TranslatorPhase,
    events: u64,
    lines: u64,
}

impl Run {
    fn step(&mut self, event: &AgentEvent) {
        self.events += 1;
        let StreamTranslator { classifier, state } = &mut self.translator;
        match classifier.classify(event, state) {
            Ok(frames) => {
                debug!(node = %event.node(), frames = frames.len(), "Classified event");
                for frame in frames {
                    self.emit(&frame);
                }
            }
            Err(FatalError { frames, error: e }) => {
                for frame in frames {
                    self.emit(&frame);
                }
                error!(error = %e, "Unrecoverable protocol error");
                self.pending.push_back(Frame::error_line(&e.to_string()));
                self.close();
            }
        }
    }

    fn emit(&mut self, frame: &Frame) {
        match frame.render() {
            Ok(line) => self.pending.push_back(line),
            Err(e) => {
                warn!(error = %e, frame = %frame.kind(), "Replacing malformed frame");
                if let Frame::ToolCall(call) = frame {
                    self.translator.state.correlator.withdraw(&call.tool_call_id);
                }
                self.pending.push_back(Frame::error_line(&e.to_string()));
            }
        }
    }

    fn close(&mut self) {
        if self.phase == TranslatorPhase::Closed {
            return;
        }
        self.phase = TranslatorPhase::Closed;
        // Release the agent run now rather than when the client finishes reading.
        self.source = Box::pin(stream::empty::<ScribeResult<AgentEvent>>());
        info!(events = self.events, "Translation closed");
    }
}

impl Drop for Run {
    fn drop(&mut self) {
        if self.phase == TranslatorPhase::Streaming {
            info!(
                events = self.events,
                lines = self.lines,
                "Client went away; cancelling agent run"
            );
        }
    }
}
