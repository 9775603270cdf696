//! LLM orchestrator with tool loop execution.
//!
//! One user input drives the cycle below until the model answers in plain
//! text or the round budget runs out:
//!
//! ```text
//! ModelQuery ──plain reply──▶ Finished
//!     │
//!     └─tool calls─▶ Dispatching ──▶ ModelQuery (next round)
//! ```
//!
//! Every model reply and every tool result is appended to the [`Session`]
//! before the next step, so the history stays consistent even when a later
//! step fails.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::mcp::capability::{Invocation, InvocationResult};
use crate::mcp::router::Router;
use crate::normalized::NormalizedEvent;
use crate::session::Session;

use super::{LlmDriver, LlmRequest, LlmSettings, ToolCall};

/// Default number of model round trips allowed per user input.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 10;

/// A tool call as assembled from the model stream, arguments still raw.
#[derive(Debug, Clone)]
struct PendingCall {
    id: String,
    name: String,
    arguments_json: String,
}

/// Where the cycle for the current input stands.
#[derive(Debug)]
enum LoopState {
    ModelQuery { round: usize },
    Dispatching { round: usize, calls: Vec<PendingCall> },
    Finished,
}

/// Drives the model and MCP dispatch for one conversation.
#[derive(Clone)]
pub struct Orchestrator {
    settings: LlmSettings,
    router: Arc<Router>,
    driver: Arc<dyn LlmDriver>,
    max_tool_rounds: usize,
}

#[allow(clippy::missing_fields_in_debug)]
impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("settings", &self.settings)
            .field("registry", self.router.registry())
            .field("max_tool_rounds", &self.max_tool_rounds)
            .finish()
    }
}

impl Orchestrator {
    /// Create an orchestrator using the driver selected by `settings`.
    pub fn new(settings: LlmSettings, router: Arc<Router>, max_tool_rounds: usize) -> Self {
        let driver = settings.driver();
        Self::with_driver(settings, router, driver, max_tool_rounds)
    }

    /// Create an orchestrator around an explicit driver.
    pub fn with_driver(
        settings: LlmSettings,
        router: Arc<Router>,
        driver: Arc<dyn LlmDriver>,
        max_tool_rounds: usize,
    ) -> Self {
        Self {
            settings,
            router,
            driver,
            max_tool_rounds: max_tool_rounds.max(1),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &LlmSettings {
        &self.settings
    }

    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    #[must_use]
    pub fn max_tool_rounds(&self) -> usize {
        self.max_tool_rounds
    }

    /// Append `input` to `session` and run the cycle.
    ///
    /// The returned stream starts with `StreamStart` and ends with either
    /// `Done` or `Error`. Driver failures never surface as stream errors.
    #[allow(clippy::too_many_lines)]
    pub fn run(
        &self,
        session: &Session,
        input: &str,
    ) -> impl Stream<Item = NormalizedEvent> + Send + use<> {
        let request_id = Uuid::new_v4().to_string();
        let orchestrator = self.clone();
        let session = session.clone();
        session.add_user_message(input);

        async_stream::stream! {
            yield NormalizedEvent::StreamStart {
                request_id: request_id.clone(),
            };

            let tools: Vec<_> = orchestrator
                .router
                .registry()
                .tools()
                .map(|(tool, _)| tool.clone())
                .collect();

            tracing::info!(
                request_id = %request_id,
                session_id = %session.id(),
                turn_count = session.turn_count(),
                tool_count = tools.len(),
                "Starting chat cycle"
            );

            let mut state = LoopState::ModelQuery { round: 1 };
            loop {
                state = match state {
                    LoopState::Finished => break,

                    LoopState::ModelQuery { round } if round > orchestrator.max_tool_rounds => {
                        tracing::error!(
                            request_id = %request_id,
                            max_tool_rounds = orchestrator.max_tool_rounds,
                            "Maximum tool rounds exceeded"
                        );
                        yield NormalizedEvent::Error {
                            message: format!(
                                "Stopped after {} model round trips without a final answer",
                                orchestrator.max_tool_rounds
                            ),
                            code: Some("MAX_ITERATIONS".to_string()),
                        };
                        LoopState::Finished
                    }

                    LoopState::ModelQuery { round } => {
                        let req = LlmRequest {
                            system: orchestrator.settings.system_prompt.clone(),
                            turns: session.turns(),
                            tools: tools.clone(),
                        };
                        tracing::debug!(
                            request_id = %request_id,
                            round,
                            turn_count = req.turns.len(),
                            "Querying model"
                        );

                        let driver_stream = match orchestrator.driver.stream(req).await {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::error!(
                                    request_id = %request_id,
                                    round,
                                    error = %e,
                                    "Failed to create driver stream"
                                );
                                yield NormalizedEvent::error(format!("{e:#}"));
                                break;
                            }
                        };

                        let mut assistant_text = String::new();
                        let mut completed: BTreeMap<usize, PendingCall> = BTreeMap::new();
                        let mut failed = false;

                        futures::pin_mut!(driver_stream);
                        while let Some(item) = driver_stream.next().await {
                            match item {
                                Ok(NormalizedEvent::Done) => break,
                                Ok(event @ NormalizedEvent::Error { .. }) => {
                                    yield event;
                                    failed = true;
                                    break;
                                }
                                Ok(event) => {
                                    match &event {
                                        NormalizedEvent::MessageDelta { text } => {
                                            assistant_text.push_str(text);
                                        }
                                        NormalizedEvent::ToolCallComplete {
                                            call_index,
                                            id,
                                            name,
                                            arguments_json,
                                        } => {
                                            completed.insert(*call_index, PendingCall {
                                                id: id.clone(),
                                                name: name.clone(),
                                                arguments_json: arguments_json.clone(),
                                            });
                                        }
                                        _ => {}
                                    }
                                    yield event;
                                }
                                Err(e) => {
                                    tracing::error!(
                                        request_id = %request_id,
                                        round,
                                        error = %e,
                                        "Driver stream failed"
                                    );
                                    yield NormalizedEvent::error(format!("{e:#}"));
                                    failed = true;
                                    break;
                                }
                            }
                        }

                        if failed {
                            LoopState::Finished
                        } else if completed.is_empty() {
                            tracing::info!(
                                request_id = %request_id,
                                round,
                                reply_length = assistant_text.len(),
                                "Plain reply"
                            );
                            session.add_assistant_message(assistant_text);
                            yield NormalizedEvent::Done;
                            LoopState::Finished
                        } else {
                            let calls: Vec<PendingCall> = completed.into_values().collect();
                            session.add_assistant_with_tool_calls(
                                assistant_text,
                                calls
                                    .iter()
                                    .map(|c| ToolCall {
                                        id: c.id.clone(),
                                        name: c.name.clone(),
                                        arguments: parse_arguments(&c.arguments_json).unwrap_or_default(),
                                    })
                                    .collect(),
                            );
                            LoopState::Dispatching { round, calls }
                        }
                    }

                    LoopState::Dispatching { round, calls } => {
                        tracing::info!(
                            request_id = %request_id,
                            round,
                            tool_call_count = calls.len(),
                            "Dispatching tool calls"
                        );
                        // Strictly sequential: each call completes before the next starts.
                        for call in calls {
                            let (content, success) = orchestrator.execute(&call).await;
                            tracing::debug!(
                                request_id = %request_id,
                                tool_id = %call.id,
                                tool_name = %call.name,
                                success,
                                result_length = content.len(),
                                "Tool call finished"
                            );
                            session.add_tool_result(&call.id, &call.name, &content, !success);
                            yield NormalizedEvent::ToolResult {
                                id: call.id,
                                name: call.name,
                                content,
                                success,
                            };
                        }
                        LoopState::ModelQuery { round: round + 1 }
                    }
                };
            }
        }
    }

    /// Run one tool call through the router. Returns the text fed back to
    /// the model and whether the call succeeded.
    async fn execute(&self, call: &PendingCall) -> (String, bool) {
        let arguments = match parse_arguments(&call.arguments_json) {
            Ok(arguments) => arguments,
            Err(message) => {
                tracing::warn!(
                    tool_id = %call.id,
                    tool_name = %call.name,
                    "Rejected tool arguments"
                );
                return (format!("Error: {message}"), false);
            }
        };

        match self
            .router
            .dispatch(Invocation::Tool {
                name: call.name.clone(),
                arguments,
            })
            .await
        {
            Ok(InvocationResult::Tool(output)) => (output.text(), !output.is_error),
            Ok(other) => (
                format!("Error: unexpected {} result for tool '{}'", other.kind(), call.name),
                false,
            ),
            Err(e) => (format!("Error: {e}"), false),
        }
    }
}

/// Parse raw tool arguments. Empty input means no arguments.
fn parse_arguments(raw: &str) -> Result<Map<String, Value>, String> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("tool arguments must be a JSON object, got {other}")),
        Err(e) => Err(format!("invalid tool arguments: {e}")),
    }
}
