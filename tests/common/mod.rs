//! Shared fixtures: an in-memory MCP connection that records every call, and
//! an LLM driver that replays canned event scripts.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use serde_json::{Map, Value, json};

use paper_relay::llm::{LlmDriver, LlmProtocol, LlmRequest, LlmSettings, Provider, Turn};
use paper_relay::mcp::capability::{
    ConnectionId, PromptDescriptor, PromptMessage, RenderedPrompt, ResourceContent,
    ResourceDescriptor, ResourceTemplateDescriptor, ToolDescriptor, ToolOutput,
};
use paper_relay::mcp::connection::{Connection, ConnectionSet};
use paper_relay::normalized::NormalizedEvent;

/// One observed call on a [`MockConnection`].
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    Start {
        connection: String,
        name: String,
        arguments: Value,
    },
    End {
        connection: String,
        name: String,
    },
}

/// Call log shared by every mock connection in a test.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    events: Arc<Mutex<Vec<CallEvent>>>,
    closed: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn events(&self) -> Vec<CallEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Ids of connections that were closed, in closing order.
    pub fn closed(&self) -> Vec<String> {
        self.closed.lock().unwrap().clone()
    }

    /// `(connection, name, arguments)` of every call that was started.
    pub fn calls(&self) -> Vec<(String, String, Value)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                CallEvent::Start {
                    connection,
                    name,
                    arguments,
                } => Some((connection, name, arguments)),
                CallEvent::End { .. } => None,
            })
            .collect()
    }

    fn push(&self, event: CallEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// In-memory stand-in for a live MCP session.
#[derive(Debug)]
pub struct MockConnection {
    id: ConnectionId,
    log: CallLog,
    tools: Vec<(ToolDescriptor, Result<ToolOutput, String>)>,
    resources: Vec<(ResourceDescriptor, String)>,
    templates: Vec<ResourceTemplateDescriptor>,
    prompts: Vec<(PromptDescriptor, String)>,
    fail_listing: bool,
    call_delay: Duration,
}

impl MockConnection {
    pub fn new(id: &str, log: &CallLog) -> Self {
        Self {
            id: ConnectionId::new(id),
            log: log.clone(),
            tools: Vec::new(),
            resources: Vec::new(),
            templates: Vec::new(),
            prompts: Vec::new(),
            fail_listing: false,
            call_delay: Duration::ZERO,
        }
    }

    /// Tool whose result is a single text block.
    pub fn with_tool(mut self, name: &str, reply: &str) -> Self {
        self.tools.push((
            tool_descriptor(name),
            Ok(ToolOutput {
                content: vec![json!({"type": "text", "text": reply})],
                structured_content: None,
                is_error: false,
            }),
        ));
        self
    }

    /// Tool whose call fails at the transport level.
    pub fn with_failing_tool(mut self, name: &str, error: &str) -> Self {
        self.tools.push((tool_descriptor(name), Err(error.to_string())));
        self
    }

    pub fn with_resource(mut self, uri: &str, text: &str) -> Self {
        self.resources.push((
            ResourceDescriptor {
                uri: uri.to_string(),
                name: uri.to_string(),
                description: None,
                mime_type: Some("text/plain".into()),
            },
            text.to_string(),
        ));
        self
    }

    /// Template resources answer with `"<owner> <uri>"`.
    pub fn with_template(mut self, template: &str) -> Self {
        self.templates.push(ResourceTemplateDescriptor {
            uri_template: template.to_string(),
            name: template.to_string(),
            description: None,
        });
        self
    }

    /// Prompt rendered as `"<text> k=v ..."` with the received arguments.
    pub fn with_prompt(mut self, name: &str, text: &str) -> Self {
        self.prompts.push((
            PromptDescriptor {
                name: name.to_string(),
                description: Some(format!("{name} prompt")),
                arguments: Vec::new(),
            },
            text.to_string(),
        ));
        self
    }

    /// Every listing call fails.
    pub fn failing_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    /// Hold every call open for `delay` between its start and end.
    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = delay;
        self
    }

    pub fn into_arc(self) -> Arc<dyn Connection> {
        Arc::new(self)
    }

    async fn record<T>(&self, name: &str, arguments: Value, result: T) -> T {
        self.log.push(CallEvent::Start {
            connection: self.id.to_string(),
            name: name.to_string(),
            arguments,
        });
        if !self.call_delay.is_zero() {
            tokio::time::sleep(self.call_delay).await;
        }
        self.log.push(CallEvent::End {
            connection: self.id.to_string(),
            name: name.to_string(),
        });
        result
    }

    fn check_listing(&self) -> anyhow::Result<()> {
        if self.fail_listing {
            anyhow::bail!("listing unavailable on {}", self.id);
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    fn close(&self) {
        self.log.closed.lock().unwrap().push(self.id.to_string());
    }

    async fn list_tools(&self) -> anyhow::Result<Vec<ToolDescriptor>> {
        self.check_listing()?;
        Ok(self.tools.iter().map(|(d, _)| d.clone()).collect())
    }

    async fn list_resources(&self) -> anyhow::Result<Vec<ResourceDescriptor>> {
        self.check_listing()?;
        Ok(self.resources.iter().map(|(d, _)| d.clone()).collect())
    }

    async fn list_resource_templates(&self) -> anyhow::Result<Vec<ResourceTemplateDescriptor>> {
        self.check_listing()?;
        Ok(self.templates.clone())
    }

    async fn list_prompts(&self) -> anyhow::Result<Vec<PromptDescriptor>> {
        self.check_listing()?;
        Ok(self.prompts.iter().map(|(d, _)| d.clone()).collect())
    }

    async fn call_tool(&self, name: &str, arguments: Map<String, Value>) -> anyhow::Result<ToolOutput> {
        let result = self
            .tools
            .iter()
            .find(|(d, _)| d.name == name)
            .map(|(_, r)| r.clone())
            .unwrap_or_else(|| Err(format!("unknown tool {name}")));
        self.record(name, Value::Object(arguments), result)
            .await
            .map_err(anyhow::Error::msg)
    }

    async fn read_resource(&self, uri: &str) -> anyhow::Result<Vec<ResourceContent>> {
        let text = self
            .resources
            .iter()
            .find(|(d, _)| d.uri == uri)
            .map_or_else(|| format!("{} {uri}", self.id), |(_, text)| text.clone());
        let contents = vec![ResourceContent::Text {
            uri: uri.to_string(),
            mime_type: Some("text/plain".into()),
            text,
        }];
        Ok(self.record(uri, Value::Null, contents).await)
    }

    async fn get_prompt(
        &self,
        name: &str,
        arguments: BTreeMap<String, String>,
    ) -> anyhow::Result<RenderedPrompt> {
        let text = self
            .prompts
            .iter()
            .find(|(d, _)| d.name == name)
            .map(|(_, t)| t.clone())
            .unwrap_or_default();
        let rendered = arguments
            .iter()
            .fold(text, |acc, (k, v)| format!("{acc} {k}={v}"));
        let args = serde_json::to_value(&arguments)?;
        let prompt = RenderedPrompt {
            description: None,
            messages: vec![PromptMessage {
                role: "user".into(),
                text: rendered,
            }],
        };
        Ok(self.record(name, args, prompt).await)
    }
}

pub fn tool_descriptor(name: &str) -> ToolDescriptor {
    ToolDescriptor {
        name: name.to_string(),
        description: Some(format!("{name} tool")),
        input_schema: json!({"type": "object"}),
    }
}

pub fn connection_set(connections: Vec<Arc<dyn Connection>>) -> ConnectionSet {
    connections.into_iter().collect()
}

/// What a [`ScriptedDriver`] was asked.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub system: Option<String>,
    pub turns: Vec<Turn>,
    pub tool_names: Vec<String>,
}

/// Driver that replays one event script per call.
#[derive(Debug, Default)]
pub struct ScriptedDriver {
    scripts: Mutex<VecDeque<Vec<anyhow::Result<NormalizedEvent>>>>,
    /// Replayed once `scripts` is exhausted.
    repeat: Option<Vec<NormalizedEvent>>,
    requests: Mutex<Vec<SeenRequest>>,
}

impl ScriptedDriver {
    pub fn new(scripts: Vec<Vec<NormalizedEvent>>) -> Self {
        Self {
            scripts: Mutex::new(
                scripts
                    .into_iter()
                    .map(|s| s.into_iter().map(Ok).collect())
                    .collect(),
            ),
            ..Self::default()
        }
    }

    /// Returns `script` on every call, forever.
    pub fn repeating(script: Vec<NormalizedEvent>) -> Self {
        Self {
            repeat: Some(script),
            ..Self::default()
        }
    }

    /// A single call whose stream fails mid-way after `events`.
    pub fn failing_after(events: Vec<NormalizedEvent>, error: &str) -> Self {
        let mut script: Vec<anyhow::Result<NormalizedEvent>> = events.into_iter().map(Ok).collect();
        script.push(Err(anyhow::anyhow!(error.to_string())));
        Self {
            scripts: Mutex::new(VecDeque::from([script])),
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmDriver for ScriptedDriver {
    async fn stream(
        &self,
        req: LlmRequest,
    ) -> anyhow::Result<std::pin::Pin<Box<dyn Stream<Item = anyhow::Result<NormalizedEvent>> + Send>>>
    {
        self.requests.lock().unwrap().push(SeenRequest {
            system: req.system.clone(),
            turns: req.turns.clone(),
            tool_names: req.tools.iter().map(|t| t.name.clone()).collect(),
        });

        let next = self.scripts.lock().unwrap().pop_front();
        let script = match next {
            Some(script) => script,
            None => match &self.repeat {
                Some(script) => script.iter().cloned().map(Ok).collect(),
                None => anyhow::bail!("no more scripted responses"),
            },
        };
        Ok(Box::pin(futures::stream::iter(script)))
    }
}

/// A plain text reply split into two deltas.
pub fn text_reply(text: &str) -> Vec<NormalizedEvent> {
    let (a, b) = text.split_at(text.len() / 2);
    vec![
        NormalizedEvent::MessageDelta { text: a.to_string() },
        NormalizedEvent::MessageDelta { text: b.to_string() },
        NormalizedEvent::Done,
    ]
}

/// A reply requesting `calls` as `(id, name, arguments_json)`.
pub fn tool_reply(calls: &[(&str, &str, &str)]) -> Vec<NormalizedEvent> {
    let mut events: Vec<NormalizedEvent> = calls
        .iter()
        .enumerate()
        .map(|(i, (id, name, args))| NormalizedEvent::ToolCallComplete {
            call_index: i,
            id: (*id).to_string(),
            name: (*name).to_string(),
            arguments_json: (*args).to_string(),
        })
        .collect();
    events.push(NormalizedEvent::Done);
    events
}

pub fn settings() -> LlmSettings {
    LlmSettings {
        base_url: "http://localhost:9".into(),
        api_key: None,
        model: "test-model".into(),
        protocol: LlmProtocol::Chat,
        provider: Provider::Generic,
        max_tokens: 1024,
        system_prompt: Some("You are a research assistant.".into()),
    }
}

/// Mapping of tool-result turns by call id.
pub fn tool_results(turns: &[Turn]) -> HashMap<String, (String, bool)> {
    turns
        .iter()
        .filter_map(|t| match t {
            Turn::ToolResult {
                tool_call_id,
                content,
                is_error,
                ..
            } => Some((tool_call_id.clone(), (content.clone(), *is_error))),
            _ => None,
        })
        .collect()
}
