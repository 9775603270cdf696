//! LLM driver traits and implementations.
//!
//! The [`LlmDriver`] trait is the streaming seam to the hosted model. The
//! [`Orchestrator`] builds on top of a driver and the MCP router to run the
//! tool loop.
//!
//! # Drivers
//!
//! - [`ChatCompletionsDriver`]: `OpenAI` Chat Completions API (`/v1/chat/completions`)
//! - [`MessagesDriver`]: Anthropic Messages API (`/v1/messages`)

pub mod chat_completions;
pub mod messages;
pub mod orchestrator;
pub mod provider;

pub use chat_completions::ChatCompletionsDriver;
pub use messages::MessagesDriver;
pub use orchestrator::Orchestrator;
pub use provider::Provider;

use std::sync::Arc;

use crate::mcp::capability::ToolDescriptor;
use crate::normalized::NormalizedEvent;
use futures::Stream;

/// LLM connection and model settings.
#[derive(Clone)]
pub struct LlmSettings {
    /// Base URL for the LLM API (e.g., `https://api.anthropic.com`).
    pub base_url: String,
    /// Optional API key for authentication.
    pub api_key: Option<String>,
    /// Model identifier.
    pub model: String,
    /// Protocol to use for communication.
    pub protocol: LlmProtocol,
    /// Provider type (auto-detected from `base_url`).
    pub provider: Provider,
    /// Upper bound on generated tokens per model call.
    pub max_tokens: u32,
    /// Optional system prompt sent with every request.
    pub system_prompt: Option<String>,
}

impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("protocol", &self.protocol)
            .field("provider", &self.provider)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl LlmSettings {
    /// The protocol actually spoken, with `Auto` resolved from the provider.
    #[must_use]
    pub fn effective_protocol(&self) -> LlmProtocol {
        match self.protocol {
            LlmProtocol::Auto => self.provider.default_protocol(),
            other => other,
        }
    }

    /// Build the driver for [`Self::effective_protocol`].
    #[must_use]
    pub fn driver(&self) -> Arc<dyn LlmDriver> {
        match self.effective_protocol() {
            LlmProtocol::Messages => Arc::new(MessagesDriver::new(self.clone())),
            LlmProtocol::Chat | LlmProtocol::Auto => {
                Arc::new(ChatCompletionsDriver::new(self.clone()))
            }
        }
    }
}

/// LLM protocol variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LlmProtocol {
    /// Pick the protocol from the provider.
    #[default]
    Auto,
    /// `OpenAI` Chat Completions API (`/v1/chat/completions`).
    Chat,
    /// Anthropic Messages API (`/v1/messages`).
    Messages,
}

impl std::str::FromStr for LlmProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" | "" => Ok(Self::Auto),
            "chat" | "openai" => Ok(Self::Chat),
            "messages" | "anthropic" => Ok(Self::Messages),
            other => Err(format!("unknown LLM protocol '{other}'")),
        }
    }
}

/// One entry of the conversation history sent to the model.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Turn {
    /// User input.
    User { content: String },
    /// Assistant reply, possibly requesting tool calls.
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    /// Result of one tool call, keyed by the call id.
    ToolResult {
        tool_call_id: String,
        name: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

/// A tool call requested by the assistant.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call identifier.
    pub id: String,
    /// Tool name as advertised in the registry.
    pub name: String,
    /// Arguments object.
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

/// Request to an LLM driver.
#[derive(Debug)]
pub struct LlmRequest {
    /// Optional system prompt.
    pub system: Option<String>,
    /// Full conversation history.
    pub turns: Vec<Turn>,
    /// Aggregated tool schemas.
    pub tools: Vec<ToolDescriptor>,
}

/// Trait for LLM streaming drivers.
///
/// Implementations emit [`NormalizedEvent`]s as the model generates output.
/// A reply that requests tools must yield one `ToolCallComplete` per call,
/// in the order the model listed them.
#[async_trait::async_trait]
pub trait LlmDriver: Send + Sync {
    /// Stream a response from the LLM.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the connection is interrupted.
    async fn stream(
        &self,
        req: LlmRequest,
    ) -> anyhow::Result<std::pin::Pin<Box<dyn Stream<Item = anyhow::Result<NormalizedEvent>> + Send>>>;
}

/// Find the position of a double newline in an SSE buffer.
pub(crate) fn find_double_newline(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}
