//! Anthropic Messages API driver.
//!
//! Implements [`LlmDriver`] for `/v1/messages`. Text arrives as
//! `content_block_delta` frames of type `text_delta`; tool calls arrive as a
//! `tool_use` content block whose input is streamed as `input_json_delta`
//! fragments and finished by `content_block_stop`.

use std::collections::BTreeMap;

use futures::{Stream, StreamExt};
use serde_json::{Value, json};

use crate::mcp::capability::ToolDescriptor;
use crate::normalized::NormalizedEvent;

use super::{LlmDriver, LlmRequest, LlmSettings, Turn, find_double_newline};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// A `tool_use` content block being assembled.
#[derive(Debug)]
struct ToolUseBlock {
    call_index: usize,
    id: String,
    name: String,
    input: String,
}

#[derive(Debug, Default)]
struct MessagesStreamState {
    /// Open `tool_use` blocks keyed by content block index.
    tool_blocks: BTreeMap<u64, ToolUseBlock>,
    next_call_index: usize,
}

impl MessagesStreamState {
    /// Decode one `data:` payload. The event type is carried in the JSON body.
    fn on_data(&mut self, data: &str) -> anyhow::Result<Vec<NormalizedEvent>> {
        let v: Value = serde_json::from_str(data)?;
        let block_index = v.get("index").and_then(Value::as_u64).unwrap_or(0);

        let mut out = Vec::new();
        match v.get("type").and_then(Value::as_str).unwrap_or_default() {
            "content_block_start" => {
                let block = &v["content_block"];
                if block.get("type").and_then(Value::as_str) == Some("tool_use") {
                    let id = block["id"].as_str().unwrap_or_default().to_string();
                    let name = block["name"].as_str().unwrap_or_default().to_string();
                    let call_index = self.next_call_index;
                    self.next_call_index += 1;

                    out.push(NormalizedEvent::ToolCallDelta {
                        call_index,
                        id: Some(id.clone()),
                        name: Some(name.clone()),
                        arguments_delta: None,
                    });
                    self.tool_blocks.insert(
                        block_index,
                        ToolUseBlock {
                            call_index,
                            id,
                            name,
                            input: String::new(),
                        },
                    );
                }
            }
            "content_block_delta" => {
                let delta = &v["delta"];
                match delta.get("type").and_then(Value::as_str) {
                    Some("text_delta") => {
                        if let Some(text) = delta.get("text").and_then(Value::as_str) {
                            if !text.is_empty() {
                                out.push(NormalizedEvent::MessageDelta {
                                    text: text.to_string(),
                                });
                            }
                        }
                    }
                    Some("input_json_delta") => {
                        let partial = delta
                            .get("partial_json")
                            .and_then(Value::as_str)
                            .unwrap_or_default();
                        if let Some(block) = self.tool_blocks.get_mut(&block_index) {
                            block.input.push_str(partial);
                            out.push(NormalizedEvent::ToolCallDelta {
                                call_index: block.call_index,
                                id: None,
                                name: None,
                                arguments_delta: Some(partial.to_string()),
                            });
                        }
                    }
                    _ => {}
                }
            }
            "content_block_stop" => {
                if let Some(block) = self.tool_blocks.remove(&block_index) {
                    let arguments_json = if block.input.trim().is_empty() {
                        "{}".to_string()
                    } else {
                        block.input
                    };
                    out.push(NormalizedEvent::ToolCallComplete {
                        call_index: block.call_index,
                        id: block.id,
                        name: block.name,
                        arguments_json,
                    });
                }
            }
            "message_stop" => out.push(NormalizedEvent::Done),
            "error" => {
                let err = &v["error"];
                out.push(NormalizedEvent::Error {
                    message: err
                        .get("message")
                        .and_then(Value::as_str)
                        .map_or_else(|| err.to_string(), ToString::to_string),
                    code: err.get("type").and_then(Value::as_str).map(ToString::to_string),
                });
            }
            // message_start, message_delta, ping
            _ => {}
        }
        Ok(out)
    }
}

/// Driver for the Anthropic Messages API.
#[derive(Clone)]
pub struct MessagesDriver {
    http: reqwest::Client,
    settings: LlmSettings,
}

impl std::fmt::Debug for MessagesDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagesDriver")
            .field("settings", &self.settings)
            .finish()
    }
}

impl MessagesDriver {
    /// Create a new Messages driver with the given settings.
    #[must_use]
    pub fn new(settings: LlmSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }
}

/// Convert the turn history into Messages API messages.
///
/// Consecutive tool results collapse into a single user message of
/// `tool_result` blocks, which is the shape the API expects after an
/// assistant turn carrying `tool_use` blocks.
pub(crate) fn anthropic_messages(turns: &[Turn]) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(turns.len());
    let mut pending_results: Vec<Value> = Vec::new();

    let flush = |out: &mut Vec<Value>, pending: &mut Vec<Value>| {
        if !pending.is_empty() {
            out.push(json!({ "role": "user", "content": std::mem::take(pending) }));
        }
    };

    for turn in turns {
        match turn {
            Turn::ToolResult {
                tool_call_id,
                content,
                is_error,
                ..
            } => pending_results.push(json!({
                "type": "tool_result",
                "tool_use_id": tool_call_id,
                "content": content,
                "is_error": is_error
            })),
            Turn::User { content } => {
                flush(&mut out, &mut pending_results);
                out.push(json!({ "role": "user", "content": content }));
            }
            Turn::Assistant {
                content,
                tool_calls,
            } => {
                flush(&mut out, &mut pending_results);
                let has_text = !content.trim().is_empty();
                if tool_calls.is_empty() {
                    // The API rejects blank non-final turns; consecutive user
                    // messages are merged on its side.
                    if has_text {
                        out.push(json!({ "role": "assistant", "content": content }));
                    }
                    continue;
                }
                let mut blocks = Vec::with_capacity(tool_calls.len() + 1);
                if has_text {
                    blocks.push(json!({ "type": "text", "text": content }));
                }
                blocks.extend(tool_calls.iter().map(|tc| {
                    json!({
                        "type": "tool_use",
                        "id": tc.id,
                        "name": tc.name,
                        "input": Value::Object(tc.arguments.clone())
                    })
                }));
                out.push(json!({ "role": "assistant", "content": blocks }));
            }
        }
    }
    flush(&mut out, &mut pending_results);
    out
}

/// Tool schemas in Messages API format.
pub(crate) fn anthropic_tools(tools: &[ToolDescriptor]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": t.description.as_deref().unwrap_or(""),
                "input_schema": t.input_schema
            })
        })
        .collect()
}

#[async_trait::async_trait]
impl LlmDriver for MessagesDriver {
    async fn stream(
        &self,
        req: LlmRequest,
    ) -> anyhow::Result<std::pin::Pin<Box<dyn Stream<Item = anyhow::Result<NormalizedEvent>> + Send>>>
    {
        let url = format!(
            "{}/v1/messages",
            self.settings.base_url.trim_end_matches('/')
        );

        let mut body = json!({
            "model": self.settings.model,
            "max_tokens": self.settings.max_tokens,
            "stream": true,
            "messages": anthropic_messages(&req.turns),
        });
        if let Some(system) = &req.system {
            body["system"] = json!(system);
        }
        if !req.tools.is_empty() {
            body["tools"] = Value::Array(anthropic_tools(&req.tools));
        }

        let mut rb = self
            .http
            .post(&url)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);
        if let Some(k) = &self.settings.api_key {
            rb = rb.header("x-api-key", k);
        }

        let resp = rb.send().await?.error_for_status()?;
        let byte_stream = resp.bytes_stream();

        let out = async_stream::try_stream! {
            let mut buf = Vec::<u8>::new();
            let mut state = MessagesStreamState::default();

            futures::pin_mut!(byte_stream);
            while let Some(chunk) = byte_stream.next().await {
                let chunk = chunk?;
                buf.extend_from_slice(&chunk);

                while let Some(pos) = find_double_newline(&buf) {
                    let frame = buf.drain(..pos + 2).collect::<Vec<_>>();
                    let text = String::from_utf8_lossy(&frame);

                    for line in text.lines() {
                        let Some(data) = line.trim().strip_prefix("data:") else {
                            continue;
                        };
                        for event in state.on_data(data.trim())? {
                            yield event;
                        }
                    }
                }
            }
        };

        Ok(Box::pin(out))
    }
}
