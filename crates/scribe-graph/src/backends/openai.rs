use crate::config::{LlmProvider, ModelConfig};
use crate::llm::{ChatModel, ChatRequest, ChunkStream, ToolSpec};
use async_trait::async_trait;
use futures_util::StreamExt;
use scribe_core::{Message, Role, ScribeError, ScribeResult};
use scribe_protocol::{FunctionDelta, MessageChunk, ToolCallChunk, UsageMetadata};
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

const CHUNK_BUFFER: usize = 256;

/// OpenAI-compatible streaming chat backend.
///
/// Works with OpenAI, OpenRouter, Groq, and any other provider that
/// implements the chat completions API with server-sent events.
pub struct OpenAiChatModel {
    config: ModelConfig,
    http: reqwest::Client,
}

impl OpenAiChatModel {
    /// A client for the model in `config`.
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn build_messages(&self, messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|m| match m.role {
                Role::Tool => json!({
                    "role": "tool",
                    "tool_call_id": m.tool_call_id.clone().unwrap_or_default(),
                    "content": m.content,
                }),
                Role::Assistant if !m.tool_calls.is_empty() => {
                    let calls: Vec<Value> = m
                        .tool_calls
                        .iter()
                        .map(|call| {
                            json!({
                                "id": call.id,
                                "type": "function",
                                "function": {
                                    "name": call.name,
                                    "arguments": call.arguments_text(),
                                }
                            })
                        })
                        .collect();
                    let content = if m.content.is_empty() {
                        Value::Null
                    } else {
                        json!(m.content)
                    };
                    json!({
                        "role": "assistant",
                        "content": content,
                        "tool_calls": calls,
                    })
                }
                Role::Assistant => json!({"role": "assistant", "content": m.content}),
                Role::User => json!({"role": "user", "content": m.content}),
                Role::System => json!({"role": "system", "content": m.content}),
            })
            .collect()
    }

    fn build_tools(&self, tools: &[ToolSpec]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters_schema,
                    }
                })
            })
            .collect()
    }

    fn build_body(&self, request: &ChatRequest) -> Value {
        let mut body = json!({
            "model": self.config.model_id,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": self.build_messages(&request.messages),
            "stream": true,
            "stream_options": {"include_usage": true},
        });

        if !request.tools.is_empty() {
            body["tools"] = json!(self.build_tools(&request.tools));
        }
        if request.json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }
        body
    }

    fn add_provider_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json");

        if matches!(self.config.provider, LlmProvider::OpenRouter) {
            request.header("X-Title", "Scribe")
        } else {
            request
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn stream(&self, request: &ChatRequest) -> ScribeResult<ChunkStream> {
        let url = format!("{}/v1/chat/completions", self.config.base_url());
        let body = self.build_body(request);

        let resp = self
            .add_provider_headers(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ScribeError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let error_body = resp
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ScribeError::Http(format!(
                "OpenAI API error {status}: {error_body}"
            )));
        }

        let (tx, rx) = mpsc::channel::<ScribeResult<MessageChunk>>(CHUNK_BUFFER);
        let mut bytes = resp.bytes_stream();

        tokio::spawn(async move {
            let mut decoder = SseDecoder::default();
            while let Some(next) = bytes.next().await {
                let chunks = match next {
                    Ok(data) => decoder.feed(&data),
                    Err(e) => {
                        warn!(error = %e, "Model stream read failed");
                        let _ = tx
                            .send(Err(ScribeError::Http(format!("Stream read error: {e}"))))
                            .await;
                        return;
                    }
                };
                for chunk in chunks {
                    if tx.send(Ok(chunk)).await.is_err() {
                        debug!("Chunk receiver dropped; abandoning model stream");
                        return;
                    }
                }
            }
            for chunk in decoder.finish() {
                if tx.send(Ok(chunk)).await.is_err() {
                    return;
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// Incremental decoder from chat-completions SSE bytes to [`MessageChunk`]s.
///
/// The chunk that carries the finish reason is held back until the trailing
/// usage event (or the end of the stream) so usage arrives on the same chunk.
/// Continuation fragments, which OpenAI identifies only by index, are given
/// the id of the call opened at that index.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    held: Option<MessageChunk>,
    ids_by_index: HashMap<u32, String>,
}

impl SseDecoder {
    /// Decodes every complete line in `bytes` plus what was buffered before.
    ///
    /// Lines are split on raw bytes and only then decoded, so a character
    /// split across two reads arrives whole.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<MessageChunk> {
        self.buffer.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=line_end).collect();
            self.decode_line(&String::from_utf8_lossy(&line), &mut out);
        }
        out
    }

    /// Flushes a trailing unterminated line and any held chunk.
    pub fn finish(&mut self) -> Vec<MessageChunk> {
        let mut out = Vec::new();
        let rest = std::mem::take(&mut self.buffer);
        self.decode_line(&String::from_utf8_lossy(&rest), &mut out);
        out.extend(self.held.take());
        out
    }

    fn decode_line(&mut self, line: &str, out: &mut Vec<MessageChunk>) {
        let line = line.trim();
        if line.is_empty() || line.starts_with(':') {
            return;
        }
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.trim();

        if data == "[DONE]" {
            out.extend(self.held.take());
            return;
        }

        let event: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, "Skipping undecodable SSE event");
                return;
            }
        };
        let usage = parse_usage(&event["usage"]);

        let Some(choice) = event["choices"].get(0) else {
            if let Some(usage) = usage {
                match self.held.take() {
                    Some(mut held) => {
                        held.usage_metadata = Some(usage);
                        out.push(held);
                    }
                    None => out.push(MessageChunk {
                        usage_metadata: Some(usage),
                        ..MessageChunk::default()
                    }),
                }
            }
            return;
        };

        let mut chunk = self.chunk_from_choice(choice);
        chunk.usage_metadata = usage;

        if chunk.finish_reason().is_some() {
            out.extend(self.held.take());
            if chunk.usage_metadata.is_some() {
                out.push(chunk);
            } else {
                self.held = Some(chunk);
            }
        } else if !chunk.is_empty() || chunk.usage_metadata.is_some() {
            out.push(chunk);
        }
    }

    fn chunk_from_choice(&mut self, choice: &Value) -> MessageChunk {
        let delta = &choice["delta"];
        let mut chunk = MessageChunk::text(delta["content"].as_str().unwrap_or_default());

        if let Some(reason) = choice["finish_reason"].as_str() {
            chunk = chunk.with_finish_reason(reason);
        }

        for tc in delta["tool_calls"].as_array().into_iter().flatten() {
            let index = tc["index"].as_u64().and_then(|i| u32::try_from(i).ok());
            let id = match (tc["id"].as_str().filter(|id| !id.is_empty()), index) {
                (Some(id), Some(index)) => {
                    self.ids_by_index.insert(index, id.to_string());
                    Some(id.to_string())
                }
                (Some(id), None) => Some(id.to_string()),
                (None, Some(index)) => self.ids_by_index.get(&index).cloned(),
                (None, None) => None,
            };
            chunk = chunk.with_tool_call(ToolCallChunk {
                index,
                id,
                function: FunctionDelta {
                    name: tc["function"]["name"].as_str().map(str::to_string),
                    arguments: tc["function"]["arguments"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string(),
                },
            });
        }
        chunk
    }
}

fn parse_usage(usage: &Value) -> Option<UsageMetadata> {
    if !usage.is_object() {
        return None;
    }
    Some(UsageMetadata {
        input_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0),
        output_tokens: usage["completion_tokens"].as_u64().unwrap_or(0),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use scribe_core::ToolCall;

    fn decode_all(events: &[&str]) -> Vec<MessageChunk> {
        let mut decoder = SseDecoder::default();
        let mut out = Vec::new();
        for event in events {
            out.extend(decoder.feed(format!("data: {event}\n\n").as_bytes()));
        }
        out.extend(decoder.finish());
        out
    }

    #[test]
    fn test_text_deltas() {
        let chunks = decode_all(&[
            r#"{"choices":[{"index":0,"delta":{"role":"assistant","content":""},"finish_reason":null}]}"#,
            r#"{"choices":[{"index":0,"delta":{"content":"Hi"},"finish_reason":null}]}"#,
            r#"{"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
            "[DONE]",
        ]);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "Hi");
        assert_eq!(chunks[1].finish_reason(), Some("stop"));
    }

    #[test]
    fn test_usage_attaches_to_held_finish_chunk() {
        let chunks = decode_all(&[
            r#"{"choices":[{"index":0,"delta":{"content":"Hi"},"finish_reason":null}],"usage":null}"#,
            r#"{"choices":[{"index":0,"delta":{},"finish_reason":"stop"}],"usage":null}"#,
            r#"{"choices":[],"usage":{"prompt_tokens":5,"completion_tokens":7,"total_tokens":12}}"#,
            "[DONE]",
        ]);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].finish_reason(), Some("stop"));
        assert_eq!(
            chunks[1].usage_metadata,
            Some(UsageMetadata {
                input_tokens: 5,
                output_tokens: 7
            })
        );
    }

    #[test]
    fn test_tool_call_fragments_get_ids_by_index() {
        let chunks = decode_all(&[
            r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call-1","type":"function","function":{"name":"search","arguments":""}}]},"finish_reason":null}]}"#,
            r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"q\":"}}]},"finish_reason":null}]}"#,
            r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":1,"id":"call-2","function":{"name":"chart","arguments":"{}"}}]},"finish_reason":null}]}"#,
            r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"x\"}"}}]},"finish_reason":null}]}"#,
            r#"{"choices":[{"index":0,"delta":{},"finish_reason":"tool_calls"}]}"#,
        ]);
        let fragments: Vec<&ToolCallChunk> = chunks
            .iter()
            .flat_map(|c| c.additional_kwargs.tool_calls.iter())
            .collect();
        assert_eq!(fragments.len(), 4);
        assert_eq!(fragments[0].call_id(), Some("call-1"));
        assert_eq!(fragments[0].function.name.as_deref(), Some("search"));
        assert_eq!(fragments[1].call_id(), Some("call-1"));
        assert_eq!(fragments[2].call_id(), Some("call-2"));
        assert_eq!(fragments[3].call_id(), Some("call-1"));
        assert_eq!(fragments[3].function.arguments, "\"x\"}");
        assert_eq!(chunks.last().unwrap().finish_reason(), Some("tool_calls"));
    }

    #[test]
    fn test_lines_split_across_reads() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.feed(b"data: {\"choices\":[{\"delta\":{\"con").is_empty());
        let chunks = decoder.feed(b"tent\":\"Hel\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "Hel");
        assert_eq!(chunks[1].content, "lo");
    }

    #[test]
    fn test_multibyte_character_split_across_reads() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"café\"}}]}\n".as_bytes();
        let split = line.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut decoder = SseDecoder::default();
        assert!(decoder.feed(&line[..split]).is_empty());
        let chunks = decoder.feed(&line[split..]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "café");
    }

    #[test]
    fn test_comments_and_garbage_are_skipped() {
        let chunks = decode_all(&[": keep-alive", "not json", r#"{"choices":[{"delta":{"content":"ok"}}]}"#]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "ok");
    }

    #[test]
    fn test_held_finish_chunk_flushed_at_end_without_done() {
        let chunks = decode_all(&[r#"{"choices":[{"delta":{},"finish_reason":"length"}]}"#]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].finish_reason(), Some("length"));
        assert!(chunks[0].usage_metadata.is_none());
    }

    #[test]
    fn test_request_body_shape() {
        let model = OpenAiChatModel::new(ModelConfig::default());
        let request = ChatRequest::new(vec![
            Message::system("be brief"),
            Message::user("topic"),
            Message::assistant_tool_calls(
                "",
                vec![ToolCall {
                    id: "call-1".into(),
                    name: "chart".into(),
                    arguments: json!({"a": 1}),
                }],
            ),
            Message::tool("call-1", "done"),
        ])
        .with_tools(vec![ToolSpec {
            name: "chart".into(),
            description: "draws".into(),
            parameters_schema: json!({"type": "object"}),
        }])
        .json();

        let body = model.build_body(&request);
        assert_eq!(body["stream"], json!(true));
        assert_eq!(body["stream_options"]["include_usage"], json!(true));
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["tools"][0]["function"]["name"], "chart");

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[2]["content"], Value::Null);
        assert_eq!(messages[2]["tool_calls"][0]["function"]["arguments"], "{\"a\":1}");
        assert_eq!(messages[3]["role"], "tool");
        assert_eq!(messages[3]["tool_call_id"], "call-1");
    }
}
