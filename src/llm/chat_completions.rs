//! OpenAI Chat Completions API driver.
//!
//! This module implements the [`LlmDriver`] trait for the OpenAI Chat Completions
//! API (`/v1/chat/completions`), supporting streaming responses and tool calls.

use std::collections::BTreeMap;

use futures::{Stream, StreamExt};
use serde_json::{Value, json};

use crate::mcp::capability::ToolDescriptor;
use crate::normalized::NormalizedEvent;

use super::{LlmDriver, LlmRequest, LlmSettings, Turn, find_double_newline};

/// Accumulated state for a streaming tool call.
#[derive(Default)]
struct ToolAccum {
    id: Option<String>,
    name: Option<String>,
    args: String,
}

/// Per-response decoding state.
#[derive(Default)]
struct ChatStreamState {
    tool_accum: BTreeMap<usize, ToolAccum>,
}

impl ChatStreamState {
    /// Decode one `data:` payload.
    fn on_data(&mut self, data: &str) -> anyhow::Result<Vec<NormalizedEvent>> {
        if data == "[DONE]" {
            return Ok(vec![NormalizedEvent::Done]);
        }

        let mut out = Vec::new();
        let v: Value = serde_json::from_str(data)?;
        if let Some(err) = v.get("error") {
            out.push(NormalizedEvent::Error {
                message: err
                    .get("message")
                    .and_then(Value::as_str)
                    .map_or_else(|| err.to_string(), ToString::to_string),
                code: err.get("code").and_then(Value::as_str).map(ToString::to_string),
            });
            return Ok(out);
        }

        let choice = &v["choices"][0];
        let delta = &choice["delta"];

        // Assistant text delta
        if let Some(s) = delta.get("content").and_then(Value::as_str) {
            if !s.is_empty() {
                out.push(NormalizedEvent::MessageDelta {
                    text: s.to_string(),
                });
            }
        }

        // Tool calls streaming deltas
        if let Some(arr) = delta.get("tool_calls").and_then(Value::as_array) {
            for tc in arr {
                let idx = tc.get("index").and_then(Value::as_u64).unwrap_or(0) as usize;
                let id = tc.get("id").and_then(Value::as_str).map(ToString::to_string);
                let name = tc
                    .get("function")
                    .and_then(|f| f.get("name"))
                    .and_then(Value::as_str)
                    .map(ToString::to_string);
                let args_delta = tc
                    .get("function")
                    .and_then(|f| f.get("arguments"))
                    .and_then(Value::as_str)
                    .map(ToString::to_string);

                let entry = self.tool_accum.entry(idx).or_default();
                if entry.id.is_none() {
                    entry.id.clone_from(&id);
                }
                if entry.name.is_none() {
                    entry.name.clone_from(&name);
                }
                if let Some(ad) = &args_delta {
                    entry.args.push_str(ad);
                }

                out.push(NormalizedEvent::ToolCallDelta {
                    call_index: idx,
                    id,
                    name,
                    arguments_delta: args_delta,
                });
            }
        }

        // Completion boundary: signal tool phase via finish_reason
        if choice.get("finish_reason").and_then(Value::as_str) == Some("tool_calls") {
            for (idx, a) in &self.tool_accum {
                if let (Some(id), Some(name)) = (&a.id, &a.name) {
                    out.push(NormalizedEvent::ToolCallComplete {
                        call_index: *idx,
                        id: id.clone(),
                        name: name.clone(),
                        arguments_json: a.args.clone(),
                    });
                }
            }
        }

        Ok(out)
    }
}

/// Driver for the OpenAI Chat Completions API.
///
/// Connects to `/v1/chat/completions` and streams responses as
/// [`NormalizedEvent`]s.
#[derive(Clone)]
pub struct ChatCompletionsDriver {
    http: reqwest::Client,
    settings: LlmSettings,
}

impl std::fmt::Debug for ChatCompletionsDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsDriver")
            .field("settings", &self.settings)
            .finish()
    }
}

impl ChatCompletionsDriver {
    /// Create a new Chat Completions driver with the given settings.
    #[must_use]
    pub fn new(settings: LlmSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }
}

/// Convert the turn history into Chat Completions messages.
pub(crate) fn chat_messages(system: Option<&str>, turns: &[Turn]) -> Vec<Value> {
    let mut out = Vec::with_capacity(turns.len() + 1);
    if let Some(system) = system {
        out.push(json!({ "role": "system", "content": system }));
    }

    for turn in turns {
        out.push(match turn {
            Turn::User { content } => json!({ "role": "user", "content": content }),
            Turn::Assistant {
                content,
                tool_calls,
            } if tool_calls.is_empty() => json!({ "role": "assistant", "content": content }),
            Turn::Assistant {
                content,
                tool_calls,
            } => json!({
                "role": "assistant",
                "content": if content.is_empty() { Value::Null } else { Value::String(content.clone()) },
                "tool_calls": tool_calls.iter().map(|tc| json!({
                    "id": tc.id,
                    "type": "function",
                    "function": {
                        "name": tc.name,
                        "arguments": Value::Object(tc.arguments.clone()).to_string()
                    }
                })).collect::<Vec<_>>()
            }),
            Turn::ToolResult {
                tool_call_id,
                content,
                ..
            } => json!({ "role": "tool", "tool_call_id": tool_call_id, "content": content }),
        });
    }
    out
}

/// Tool schemas in `OpenAI` function format.
pub(crate) fn chat_tools(tools: &[ToolDescriptor]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description.as_deref().unwrap_or(""),
                    "parameters": t.input_schema
                }
            })
        })
        .collect()
}

#[async_trait::async_trait]
impl LlmDriver for ChatCompletionsDriver {
    async fn stream(
        &self,
        req: LlmRequest,
    ) -> anyhow::Result<std::pin::Pin<Box<dyn Stream<Item = anyhow::Result<NormalizedEvent>> + Send>>>
    {
        let url = format!(
            "{}/v1/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        );

        let tools = chat_tools(&req.tools);
        let body = json!({
            "model": self.settings.model,
            "stream": true,
            "max_tokens": self.settings.max_tokens,
            "messages": chat_messages(req.system.as_deref(), &req.turns),
            "tools": if tools.is_empty() { Value::Null } else { Value::Array(tools) }
        });

        let mut rb = self.http.post(&url).json(&body);
        if let Some(k) = &self.settings.api_key {
            rb = rb.bearer_auth(k);
        }

        let resp = rb.send().await?.error_for_status()?;
        let byte_stream = resp.bytes_stream();

        let out = async_stream::try_stream! {
            let mut buf = Vec::<u8>::new();
            let mut state = ChatStreamState::default();

            futures::pin_mut!(byte_stream);
            while let Some(chunk) = byte_stream.next().await {
                let chunk = chunk?;
                buf.extend_from_slice(&chunk);

                while let Some(pos) = find_double_newline(&buf) {
                    let frame = buf.drain(..pos + 2).collect::<Vec<_>>();
                    let text = String::from_utf8_lossy(&frame);

                    for line in text.lines() {
                        let line = line.trim();
                        let Some(data) = line.strip_prefix("data:") else {
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
