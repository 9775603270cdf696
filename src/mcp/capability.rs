//! Capability descriptors and the tagged invocation/result shapes.
//!
//! Tools, resources and prompts share the "named capability on a
//! connection" shape but take and return different things, so each
//! [`Invocation`] variant carries its own argument type and each
//! [`InvocationResult`] variant its own payload.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a connection, the server name from the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// The three kinds of capability a server can advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityKind {
    Tool,
    Resource,
    Prompt,
}

impl CapabilityKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::Resource => "resource",
            Self::Prompt => "prompt",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A capability as the registry records it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub connection: ConnectionId,
    pub kind: CapabilityKind,
}

/// A tool advertised by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// JSON schema of the tool's arguments.
    pub input_schema: serde_json::Value,
}

/// A concrete resource advertised by `resources/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// A parameterised resource advertised by `resources/templates/list`,
/// e.g. `papers://{topic}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTemplateDescriptor {
    pub uri_template: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptArgument {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

/// A prompt advertised by `prompts/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub arguments: Vec<PromptArgument>,
}

/// A request to run one capability.
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    Tool {
        name: String,
        arguments: serde_json::Map<String, serde_json::Value>,
    },
    Resource {
        uri: String,
    },
    Prompt {
        name: String,
        arguments: BTreeMap<String, String>,
    },
}

impl Invocation {
    #[must_use]
    pub fn kind(&self) -> CapabilityKind {
        match self {
            Self::Tool { .. } => CapabilityKind::Tool,
            Self::Resource { .. } => CapabilityKind::Resource,
            Self::Prompt { .. } => CapabilityKind::Prompt,
        }
    }

    /// Name used for registry lookup (the URI for resources).
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Tool { name, .. } | Self::Prompt { name, .. } => name,
            Self::Resource { uri } => uri,
        }
    }
}

/// Result of `tools/call`, passed through without interpretation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Content blocks exactly as the server returned them.
    pub content: Vec<serde_json::Value>,
    #[serde(default)]
    pub structured_content: Option<serde_json::Value>,
    /// Set by the server when the tool itself reported a failure.
    #[serde(default)]
    pub is_error: bool,
}

impl ToolOutput {
    /// Concatenated text of all `text` content blocks; other blocks are
    /// rendered as JSON.
    #[must_use]
    pub fn text(&self) -> String {
        let parts: Vec<String> = self
            .content
            .iter()
            .map(|block| match block.get("text").and_then(|t| t.as_str()) {
                Some(text) if block.get("type").and_then(|t| t.as_str()) == Some("text") => {
                    text.to_string()
                }
                _ => block.to_string(),
            })
            .collect();

        if parts.is_empty() {
            self.structured_content
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default()
        } else {
            parts.join("\n")
        }
    }
}

/// One entry of a `resources/read` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceContent {
    Text {
        uri: String,
        #[serde(default)]
        mime_type: Option<String>,
        text: String,
    },
    Blob {
        uri: String,
        #[serde(default)]
        mime_type: Option<String>,
        /// Base64 payload.
        blob: String,
    },
}

/// One message of a `prompts/get` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedPrompt {
    #[serde(default)]
    pub description: Option<String>,
    pub messages: Vec<PromptMessage>,
}

impl RenderedPrompt {
    /// All message texts joined by blank lines.
    #[must_use]
    pub fn text(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// What a dispatch returns, one variant per [`Invocation`] variant.
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationResult {
    Tool(ToolOutput),
    Resource(Vec<ResourceContent>),
    Prompt(RenderedPrompt),
}

impl InvocationResult {
    #[must_use]
    pub fn kind(&self) -> CapabilityKind {
        match self {
            Self::Tool(_) => CapabilityKind::Tool,
            Self::Resource(_) => CapabilityKind::Resource,
            Self::Prompt(_) => CapabilityKind::Prompt,
        }
    }
}
