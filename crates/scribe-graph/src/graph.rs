use crate::llm::{ChatModel, ChatRequest};
use crate::prompts::Prompts;
use crate::retry::{with_retry, RetryPolicy};
use crate::search::{SearchProvider, SubjectResults};
use crate::tools::ToolRegistry;
use futures_util::future::join_all;
use futures_util::{Stream, StreamExt};
use scribe_core::{Message, ScribeError, ScribeResult, ToolCall, ToolResult};
use scribe_protocol::{
    AgentEvent, EventStream, FinishReason, MessageChunk, ToolCallCorrelator, ToolMessage,
};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

/// Breaks the topic into search subjects.
pub const PLANNER: &str = "planner";
/// Runs one web search per subject.
pub const WEB_SEARCH: &str = "web_search";
/// Writes the report and calls tools.
pub const REPORTER: &str = "reporter";

const NODES: [&str; 3] = [PLANNER, WEB_SEARCH, REPORTER];

/// Longest topic accepted by default, in characters.
pub const DEFAULT_MAX_TOPIC_CHARS: usize = 50;
/// Events buffered between a run and its consumer by default.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

const CONSUMER_GONE: &str = "event consumer went away";

/// What a graph run is asked to research.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphInput {
    /// The subject to research.
    pub topic: String,
}

/// Why a topic was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopicError {
    /// Nothing but whitespace.
    #[error("topic must not be empty")]
    Empty,

    /// Over the character limit.
    #[error("topic is {chars} characters long; at most {max} are allowed")]
    TooLong {
        /// Characters in the topic.
        chars: usize,
        /// The limit.
        max: usize,
    },
}

impl From<TopicError> for ScribeError {
    fn from(e: TopicError) -> Self {
        ScribeError::Validation(e.to_string())
    }
}

impl GraphInput {
    /// An input for `topic`, as given.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
        }
    }

    /// Rejects blank topics and topics longer than `max_chars` characters.
    pub fn validate(&self, max_chars: usize) -> Result<(), TopicError> {
        if self.topic.trim().is_empty() {
            return Err(TopicError::Empty);
        }
        let chars = self.topic.chars().count();
        if chars > max_chars {
            return Err(TopicError::TooLong {
                chars,
                max: max_chars,
            });
        }
        Ok(())
    }
}

/// A runnable agent graph.
///
/// `stream` starts a run and returns its events as they happen, each tagged
/// with the node that produced it. Dropping the stream cancels the run.
pub trait AgentGraph: Send + Sync {
    /// Names of the nodes whose events the stream can carry.
    fn nodes(&self) -> &[&'static str];

    /// Starts a run on `input`.
    fn stream(&self, input: GraphInput) -> EventStream;
}

/// Run limits for [`ResearchGraph`].
#[derive(Debug, Clone)]
pub struct GraphSettings {
    /// Reporter model turns allowed per run.
    pub max_turns: u32,
    /// Events buffered between the run and its consumer.
    pub channel_capacity: usize,
    /// Retries around each model request.
    pub retry: RetryPolicy,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            max_turns: 8,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            retry: RetryPolicy::default(),
        }
    }
}

/// planner → web_search → reporter.
///
/// Built once per process and shared by every request; each call to
/// [`AgentGraph::stream`] runs on its own task.
#[derive(Clone)]
pub struct ResearchGraph {
    model: Arc<dyn ChatModel>,
    search: Arc<dyn SearchProvider>,
    tools: Arc<ToolRegistry>,
    prompts: Arc<Prompts>,
    settings: GraphSettings,
}

impl ResearchGraph {
    /// Assembles the graph from its collaborators.
    pub fn new(
        model: Arc<dyn ChatModel>,
        search: Arc<dyn SearchProvider>,
        tools: ToolRegistry,
        prompts: Prompts,
        settings: GraphSettings,
    ) -> Self {
        Self {
            model,
            search,
            tools: Arc::new(tools),
            prompts: Arc::new(prompts),
            settings,
        }
    }

    async fn run(&self, input: GraphInput, tx: &mpsc::Sender<ScribeResult<AgentEvent>>) -> ScribeResult<()> {
        info!(topic = %input.topic, "Research run started");
        let subjects = self.plan(&input.topic, tx).await?;
        let results = self.web_search(&subjects).await;
        self.report(&input.topic, &results, tx).await?;
        info!(topic = %input.topic, "Research run finished");
        Ok(())
    }

    async fn plan(&self, topic: &str, tx: &mpsc::Sender<ScribeResult<AgentEvent>>) -> ScribeResult<Vec<String>> {
        let system = Prompts::render(&self.prompts.planner, &[("topic", topic)]);
        let request = ChatRequest::new(vec![Message::system(system), Message::user(topic)]).json();
        let turn = self.stream_turn(PLANNER, &request, tx).await?;
        let subjects = parse_subjects(&turn.text)?;
        info!(subjects = subjects.len(), "Planned search subjects");
        Ok(subjects)
    }

    async fn web_search(&self, subjects: &[String]) -> Vec<SubjectResults> {
        let searches = subjects.iter().map(|subject| async move {
            let hits = match self.search.search(subject).await {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(node = WEB_SEARCH, subject = %subject, error = %e, "Search failed; continuing without results");
                    Vec::new()
                }
            };
            SubjectResults {
                subject: subject.clone(),
                hits,
            }
        });
        join_all(searches).await
    }

    async fn report(
        &self,
        topic: &str,
        results: &[SubjectResults],
        tx: &mpsc::Sender<ScribeResult<AgentEvent>>,
    ) -> ScribeResult<()> {
        let search_results = serde_json::to_string_pretty(results)?;
        let system = Prompts::render(
            &self.prompts.reporter,
            &[("topic", topic), ("search_results", &search_results)],
        );
        let mut messages = vec![Message::system(system), Message::user(topic)];
        let tools = self.tools.specs();

        for turn_no in 1..=self.settings.max_turns {
            let request = ChatRequest::new(messages.clone()).with_tools(tools.clone());
            let mut turn = self.stream_turn(REPORTER, &request, tx).await?;
            let calls = turn.take_tool_calls();

            if turn.finish_reason != Some(FinishReason::ToolCalls) || calls.is_empty() {
                debug!(turns = turn_no, "Reporter finished");
                return Ok(());
            }

            messages.push(Message::assistant_tool_calls(turn.text, calls.clone()));
            for call in calls {
                let name = call.name.clone();
                let result = self.execute_tool(call).await;
                messages.push(Message::tool_result(&result));
                let message = ToolMessage {
                    name: Some(name),
                    ..ToolMessage::from(result)
                };
                send(tx, AgentEvent::tool_result(REPORTER, message)).await?;
            }
        }

        Err(ScribeError::Agent(format!(
            "reporter did not finish within {} turns",
            self.settings.max_turns
        )))
    }

    async fn execute_tool(&self, call: ToolCall) -> ToolResult {
        let call_id = call.id.clone();
        match self.tools.execute(call).await {
            Ok(result) => result,
            Err(e) => {
                warn!(tool_call_id = %call_id, error = %e, "Tool execution failed");
                ToolResult::error(call_id, e.to_string())
            }
        }
    }

    /// Streams one model turn, forwarding every chunk tagged with `node`.
    async fn stream_turn(
        &self,
        node: &'static str,
        request: &ChatRequest,
        tx: &mpsc::Sender<ScribeResult<AgentEvent>>,
    ) -> ScribeResult<Turn> {
        let mut chunks = with_retry(&self.settings.retry, node, || self.model.stream(request)).await?;
        let mut turn = Turn::default();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            turn.absorb(&chunk);
            send(tx, AgentEvent::chunk(node, chunk)).await?;
        }
        debug!(node, chars = turn.text.len(), finish_reason = ?turn.finish_reason, "Model turn ended");
        Ok(turn)
    }
}

impl AgentGraph for ResearchGraph {
    fn nodes(&self) -> &[&'static str] {
        &NODES
    }

    fn stream(&self, input: GraphInput) -> EventStream {
        let (tx, rx) = mpsc::channel(self.settings.channel_capacity.max(1));
        let graph = self.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = graph.run(input, &tx).await {
                if tx.is_closed() {
                    info!("Research run cancelled");
                } else {
                    error!(error = %e, "Research run failed");
                    let _ = tx.send(Err(e)).await;
                }
            }
        });
        Box::pin(RunStream {
            events: ReceiverStream::new(rx),
            task,
        })
    }
}

async fn send(tx: &mpsc::Sender<ScribeResult<AgentEvent>>, event: AgentEvent) -> ScribeResult<()> {
    tx.send(Ok(event))
        .await
        .map_err(|_| ScribeError::Agent(CONSUMER_GONE.into()))
}

/// Events of one run. Dropping it aborts the run's task.
struct RunStream {
    events: ReceiverStream<ScribeResult<AgentEvent>>,
    task: JoinHandle<()>,
}

impl Stream for RunStream {
    type Item = ScribeResult<AgentEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

impl Drop for RunStream {
    fn drop(&mut self) {
        if !self.task.is_finished() {
            debug!("Aborting research run");
            self.task.abort();
        }
    }
}

/// What one model turn produced, reassembled from its chunks.
#[derive(Debug, Default)]
struct Turn {
    text: String,
    finish_reason: Option<FinishReason>,
    calls: ToolCallCorrelator,
}

impl Turn {
    fn absorb(&mut self, chunk: &MessageChunk) {
        self.text.push_str(&chunk.content);
        for fragment in &chunk.additional_kwargs.tool_calls {
            if let Err(e) = self.calls.on_fragment(
                fragment.call_id(),
                fragment.function.name.as_deref(),
                &fragment.function.arguments,
            ) {
                warn!(error = %e, "Dropping tool-call fragment");
            }
        }
        if let Some(reason) = chunk.finish_reason() {
            self.finish_reason = Some(FinishReason::normalize(reason));
        }
    }

    fn take_tool_calls(&mut self) -> Vec<ToolCall> {
        self.calls.flush_all().into_iter().map(ToolCall::from).collect()
    }
}

#[derive(Debug, Deserialize)]
struct PlannedSubjects {
    subjects: Vec<String>,
}

/// Reads `{"subjects": [...]}` from planner output, tolerating a markdown
/// code fence around it.
pub fn parse_subjects(text: &str) -> ScribeResult<Vec<String>> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);

    let planned: PlannedSubjects = serde_json::from_str(body.trim())
        .map_err(|e| ScribeError::Agent(format!("planner returned malformed subjects: {e}")))?;
    let subjects: Vec<String> = planned
        .subjects
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if subjects.is_empty() {
        return Err(ScribeError::Agent("planner produced no search subjects".into()));
    }
    Ok(subjects)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use scribe_protocol::ToolCallChunk;

    #[test]
    fn test_topic_validation() {
        assert!(GraphInput::new("rust").validate(50).is_ok());
        assert!(GraphInput::new("x".repeat(50)).validate(50).is_ok());
        assert_eq!(
            GraphInput::new("x".repeat(51)).validate(50),
            Err(TopicError::TooLong { chars: 51, max: 50 })
        );
        assert!(GraphInput::new("   ").validate(50).is_err());
        // Characters, not bytes.
        assert!(GraphInput::new("é".repeat(50)).validate(50).is_ok());
    }

    #[test]
    fn test_parse_subjects() {
        assert_eq!(
            parse_subjects(r#"{"subjects": ["a", " b ", ""]}"#).unwrap(),
            vec!["a", "b"]
        );
        assert_eq!(
            parse_subjects("```json\n{\"subjects\": [\"a\"]}\n```").unwrap(),
            vec!["a"]
        );
        assert!(parse_subjects(r#"{"subjects": []}"#).is_err());
        assert!(parse_subjects("not json").is_err());
    }

    #[test]
    fn test_turn_reassembles_tool_calls() {
        let mut turn = Turn::default();
        turn.absorb(&MessageChunk::default().with_tool_call(ToolCallChunk::start("c1", "chart", "{\"a\":")));
        turn.absorb(&MessageChunk::default().with_tool_call(ToolCallChunk::continuation("1}")));
        turn.absorb(&MessageChunk::default().with_finish_reason("tool_calls"));

        assert_eq!(turn.finish_reason, Some(FinishReason::ToolCalls));
        let calls = turn.take_tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "c1");
        assert_eq!(calls[0].arguments, serde_json::json!({"a": 1}));
    }
}
