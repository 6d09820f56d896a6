use crate::error::ProtocolError;
use scribe_core::ToolCall;
use serde_json::{Map, Value};
use std::collections::{HashSet, VecDeque};
use tracing::debug;

/// Default ceiling on tool calls that may be open at once in one request.
pub const DEFAULT_MAX_OPEN_TOOL_CALLS: usize = 64;

/// A tool call whose arguments are still arriving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingToolCall {
    /// Stable key of the call while it is open.
    pub tool_call_id: String,
    /// Name from the opening fragment; empty when the model sent none.
    pub tool_name: String,
    /// Argument text accumulated so far.
    pub args_text: String,
}

/// Arguments of a finalized call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolArgs {
    /// The accumulated text parsed to a JSON object.
    Parsed(Value),
    /// The accumulated text was not a JSON object.
    Invalid {
        /// The text as received.
        raw: String,
        /// Why it did not parse.
        reason: String,
    },
}

impl ToolArgs {
    fn parse(text: &str) -> Self {
        if text.trim().is_empty() {
            return ToolArgs::Parsed(Value::Object(Map::new()));
        }
        match serde_json::from_str::<Value>(text) {
            Ok(value) if value.is_object() => ToolArgs::Parsed(value),
            Ok(_) => ToolArgs::Invalid {
                raw: text.to_string(),
                reason: "arguments are not a JSON object".to_string(),
            },
            Err(e) => ToolArgs::Invalid {
                raw: text.to_string(),
                reason: e.to_string(),
            },
        }
    }

    /// The value written into a `ToolCallPart`; invalid arguments become `{}`.
    pub fn to_frame_args(&self) -> Value {
        match self {
            ToolArgs::Parsed(value) => value.clone(),
            ToolArgs::Invalid { .. } => Value::Object(Map::new()),
        }
    }
}

/// A call that has been flushed and is waiting for its result.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedCall {
    /// Id the call was opened with.
    pub tool_call_id: String,
    /// Tool the model asked for.
    pub tool_name: String,
    /// Parsed arguments, or why they did not parse.
    pub args: ToolArgs,
}

impl From<FinalizedCall> for ToolCall {
    /// The call as a tool executes it; invalid arguments become `{}`.
    fn from(call: FinalizedCall) -> Self {
        ToolCall::new(call.tool_call_id, call.tool_name, call.args.to_frame_args())
    }
}

/// A finalized call paired with the result that answered it.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedResult {
    /// The oldest call that was awaiting a result.
    pub call: FinalizedCall,
    /// The result paired with it.
    pub result: Value,
    /// The call's frame never reached the client.
    pub withdrawn: bool,
}

/// What a fragment did to the correlator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentOutcome {
    /// A new pending call was opened (and the fragment's text appended).
    Opened {
        /// Id of the new call.
        tool_call_id: String,
        /// Its tool name.
        tool_name: String,
    },
    /// The fragment's text was appended to an open call.
    Appended {
        /// Id of the call that grew.
        tool_call_id: String,
    },
    /// The fragment belongs to a call rejected earlier and was dropped.
    Ignored,
}

#[derive(Debug)]
enum Current {
    Open(String),
    Rejected(String),
}

/// Reassembles streamed tool-call fragments and pairs flushed calls with
/// their results.
///
/// One correlator lives for exactly one translation. Results are paired with
/// calls strictly first-in-first-out, in flush order.
#[derive(Debug)]
pub struct ToolCallCorrelator {
    open: Vec<PendingToolCall>,
    awaiting: VecDeque<FinalizedCall>,
    flushed: HashSet<String>,
    rejected: HashSet<String>,
    withdrawn: HashSet<String>,
    current: Option<Current>,
    max_open_calls: usize,
}

impl ToolCallCorrelator {
    /// Creates a correlator allowing at most `max_open_calls` open calls.
    pub fn new(max_open_calls: usize) -> Self {
        Self {
            open: Vec::new(),
            awaiting: VecDeque::new(),
            flushed: HashSet::new(),
            rejected: HashSet::new(),
            withdrawn: HashSet::new(),
            current: None,
            max_open_calls,
        }
    }

    /// Feeds one fragment.
    ///
    /// With an `id`, the fragment opens that call if it is new and appends to
    /// it otherwise. Without one, it appends to the most recently opened call.
    pub fn on_fragment(
        &mut self,
        id: Option<&str>,
        name: Option<&str>,
        delta: &str,
    ) -> Result<FragmentOutcome, ProtocolError> {
        let id = match (id, &self.current) {
            (Some(id), _) => id.to_string(),
            (None, Some(Current::Open(id))) => id.clone(),
            (None, Some(Current::Rejected(_))) => return Ok(FragmentOutcome::Ignored),
            (None, None) => {
                return Err(ProtocolError::ProtocolOrderViolation(
                    "tool-call continuation with no open call".to_string(),
                ))
            }
        };

        if self.rejected.contains(&id) {
            return Ok(FragmentOutcome::Ignored);
        }
        if self.flushed.contains(&id) {
            return Err(ProtocolError::ProtocolOrderViolation(format!(
                "fragment for tool call {id} after it was flushed"
            )));
        }

        if let Some(call) = self.open.iter_mut().find(|call| call.tool_call_id == id) {
            call.args_text.push_str(delta);
            self.current = Some(Current::Open(id.clone()));
            return Ok(FragmentOutcome::Appended { tool_call_id: id });
        }

        if self.open.len() >= self.max_open_calls {
            self.rejected.insert(id.clone());
            self.current = Some(Current::Rejected(id));
            return Err(ProtocolError::TooManyOpenToolCalls {
                limit: self.max_open_calls,
            });
        }

        let tool_name = name.unwrap_or_default().to_string();
        debug!(tool_call_id = %id, tool = %tool_name, "Opened tool call");
        self.open.push(PendingToolCall {
            tool_call_id: id.clone(),
            tool_name: tool_name.clone(),
            args_text: delta.to_string(),
        });
        self.current = Some(Current::Open(id.clone()));
        Ok(FragmentOutcome::Opened {
            tool_call_id: id,
            tool_name,
        })
    }

    /// Finalizes every open call, in open order, and queues them for results.
    pub fn flush_all(&mut self) -> Vec<FinalizedCall> {
        self.current = None;
        let finalized: Vec<FinalizedCall> = self
            .open
            .drain(..)
            .map(|pending| FinalizedCall {
                args: ToolArgs::parse(&pending.args_text),
                tool_call_id: pending.tool_call_id,
                tool_name: pending.tool_name,
            })
            .collect();

        for call in &finalized {
            self.flushed.insert(call.tool_call_id.clone());
            self.awaiting.push_back(call.clone());
        }
        debug!(
            flushed = finalized.len(),
            awaiting = self.awaiting.len(),
            "Flushed tool calls"
        );
        finalized
    }

    /// Pairs `result` with the oldest call still awaiting one.
    ///
    /// A withdrawn call still takes its place in the queue, so later results
    /// keep pairing in flush order.
    pub fn match_result(&mut self, result: Value) -> Option<MatchedResult> {
        let call = self.awaiting.pop_front()?;
        let withdrawn = self.withdrawn.remove(&call.tool_call_id);
        Some(MatchedResult {
            call,
            result,
            withdrawn,
        })
    }

    /// Marks an awaiting call whose frame could not be sent. Returns `false`
    /// when no such call is awaiting.
    pub fn withdraw(&mut self, tool_call_id: &str) -> bool {
        let awaiting = self
            .awaiting
            .iter()
            .any(|call| call.tool_call_id == tool_call_id);
        if awaiting {
            self.withdrawn.insert(tool_call_id.to_string());
        }
        awaiting
    }

    /// Calls whose arguments are still arriving.
    pub fn open_calls(&self) -> &[PendingToolCall] {
        &self.open
    }

    /// Number of flushed calls still waiting for a result.
    pub fn awaiting_count(&self) -> usize {
        self.awaiting.len()
    }
}

impl Default for ToolCallCorrelator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_OPEN_TOOL_CALLS)
    }
}
