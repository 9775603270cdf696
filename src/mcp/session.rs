//! rmcp-backed [`Connection`] implementation.

use std::collections::BTreeMap;

use anyhow::Context;
use async_trait::async_trait;
use rmcp::{
    model::{
        CallToolRequestParam, GetPromptRequestParam, PromptMessageContent,
        ReadResourceRequestParam, ResourceContents,
    },
    service::ServiceExt,
    transport::{StreamableHttpClientTransport, TokioChildProcess},
};
use tokio::process::Command;
use url::Url;

use crate::mcp::capability::{
    ConnectionId, PromptArgument, PromptDescriptor, PromptMessage, RenderedPrompt,
    ResourceContent, ResourceDescriptor, ResourceTemplateDescriptor, ToolDescriptor, ToolOutput,
};
use crate::mcp::config::{
    McpConfig, McpServerEntry, expand_env_map, expand_env_placeholders_with,
};
use crate::mcp::connection::{Connection, ConnectionSet};

type DynClientService = rmcp::service::RunningService<
    rmcp::service::RoleClient,
    Box<dyn rmcp::service::DynService<rmcp::service::RoleClient>>,
>;

/// A configured server that could not be brought up at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("failed to launch '{server}' ({command}): {message}")]
    Spawn {
        server: String,
        command: String,
        message: String,
    },

    #[error("invalid url for '{server}': {url}")]
    InvalidUrl { server: String, url: String },

    #[error("MCP handshake with '{server}' failed: {message}")]
    Handshake { server: String, message: String },
}

impl ConnectError {
    #[must_use]
    pub fn server(&self) -> &str {
        match self {
            Self::Spawn { server, .. }
            | Self::InvalidUrl { server, .. }
            | Self::Handshake { server, .. } => server,
        }
    }
}

/// One live MCP client session.
pub struct McpSession {
    id: ConnectionId,
    service: DynClientService,
}

impl std::fmt::Debug for McpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpSession").field("id", &self.id).finish()
    }
}

impl McpSession {
    /// Launch or dial one server and complete the MCP handshake.
    pub async fn connect(name: &str, entry: &McpServerEntry) -> Result<Self, ConnectError> {
        let service = match entry {
            McpServerEntry::Stdio { command, args, env } => {
                let env = expand_env_map(env);

                let mut cmd = Command::new(command);
                cmd.args(args);
                for (k, v) in env {
                    cmd.env(k, v);
                }

                let transport = TokioChildProcess::new(cmd).map_err(|e| ConnectError::Spawn {
                    server: name.to_string(),
                    command: entry.describe(),
                    message: e.to_string(),
                })?;

                ().into_dyn()
                    .serve(transport)
                    .await
                    .map_err(|e| ConnectError::Handshake {
                        server: name.to_string(),
                        message: e.to_string(),
                    })?
            }

            McpServerEntry::RemoteHttp { url, env } => {
                let expanded = expand_env_placeholders_with(url, &expand_env_map(env));
                // Keep secrets out of the error: report the unexpanded url.
                let parsed = Url::parse(&expanded).map_err(|_| ConnectError::InvalidUrl {
                    server: name.to_string(),
                    url: url.clone(),
                })?;

                let transport = StreamableHttpClientTransport::from_uri(parsed.to_string());
                ().into_dyn()
                    .serve(transport)
                    .await
                    .map_err(|e| ConnectError::Handshake {
                        server: name.to_string(),
                        message: e.to_string(),
                    })?
            }
        };

        Ok(Self {
            id: ConnectionId::new(name),
            service,
        })
    }

    /// Whether the server advertised a capability group during the
    /// handshake. Unknown when the server sent no info.
    fn advertises(&self, pick: impl Fn(&rmcp::model::ServerCapabilities) -> bool) -> bool {
        self.service
            .peer_info()
            .is_none_or(|info| pick(&info.capabilities))
    }
}

#[async_trait]
impl Connection for McpSession {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    fn close(&self) {
        self.service.cancellation_token().cancel();
    }

    async fn list_tools(&self) -> anyhow::Result<Vec<ToolDescriptor>> {
        if !self.advertises(|c| c.tools.is_some()) {
            return Ok(Vec::new());
        }
        let tools = self
            .service
            .list_all_tools()
            .await
            .with_context(|| format!("tools/list failed for MCP server '{}'", self.id))?;

        Ok(tools
            .into_iter()
            .map(|t| ToolDescriptor {
                name: t.name.to_string(),
                description: t.description.map(|d| d.to_string()),
                input_schema: serde_json::Value::Object((*t.input_schema).clone()),
            })
            .collect())
    }

    async fn list_resources(&self) -> anyhow::Result<Vec<ResourceDescriptor>> {
        if !self.advertises(|c| c.resources.is_some()) {
            return Ok(Vec::new());
        }
        let resources = self
            .service
            .list_all_resources()
            .await
            .with_context(|| format!("resources/list failed for MCP server '{}'", self.id))?;

        Ok(resources
            .into_iter()
            .map(|r| ResourceDescriptor {
                uri: r.raw.uri,
                name: r.raw.name,
                description: r.raw.description,
                mime_type: r.raw.mime_type,
            })
            .collect())
    }

    async fn list_resource_templates(&self) -> anyhow::Result<Vec<ResourceTemplateDescriptor>> {
        if !self.advertises(|c| c.resources.is_some()) {
            return Ok(Vec::new());
        }
        let templates = self
            .service
            .list_all_resource_templates()
            .await
            .with_context(|| {
                format!("resources/templates/list failed for MCP server '{}'", self.id)
            })?;

        Ok(templates
            .into_iter()
            .map(|t| ResourceTemplateDescriptor {
                uri_template: t.raw.uri_template,
                name: t.raw.name,
                description: t.raw.description,
            })
            .collect())
    }

    async fn list_prompts(&self) -> anyhow::Result<Vec<PromptDescriptor>> {
        if !self.advertises(|c| c.prompts.is_some()) {
            return Ok(Vec::new());
        }
        let prompts = self
            .service
            .list_all_prompts()
            .await
            .with_context(|| format!("prompts/list failed for MCP server '{}'", self.id))?;

        Ok(prompts
            .into_iter()
            .map(|p| PromptDescriptor {
                name: p.name,
                description: p.description,
                arguments: p
                    .arguments
                    .unwrap_or_default()
                    .into_iter()
                    .map(|a| PromptArgument {
                        name: a.name,
                        description: a.description,
                        required: a.required.unwrap_or(false),
                    })
                    .collect(),
            })
            .collect())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> anyhow::Result<ToolOutput> {
        let res = self
            .service
            .call_tool(CallToolRequestParam {
                name: name.to_string().into(),
                arguments: Some(arguments),
            })
            .await
            .with_context(|| format!("tools/call failed for {}::{name}", self.id))?;

        let content = res
            .content
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ToolOutput {
            content,
            structured_content: res.structured_content,
            is_error: res.is_error.unwrap_or(false),
        })
    }

    async fn read_resource(&self, uri: &str) -> anyhow::Result<Vec<ResourceContent>> {
        let res = self
            .service
            .read_resource(ReadResourceRequestParam {
                uri: uri.to_string(),
            })
            .await
            .with_context(|| format!("resources/read failed for {}::{uri}", self.id))?;

        Ok(res
            .contents
            .into_iter()
            .map(|c| match c {
                ResourceContents::TextResourceContents {
                    uri,
                    mime_type,
                    text,
                    ..
                } => ResourceContent::Text {
                    uri,
                    mime_type,
                    text,
                },
                ResourceContents::BlobResourceContents {
                    uri,
                    mime_type,
                    blob,
                    ..
                } => ResourceContent::Blob {
                    uri,
                    mime_type,
                    blob,
                },
            })
            .collect())
    }

    async fn get_prompt(
        &self,
        name: &str,
        arguments: BTreeMap<String, String>,
    ) -> anyhow::Result<RenderedPrompt> {
        let arguments: serde_json::Map<String, serde_json::Value> = arguments
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect();

        let res = self
            .service
            .get_prompt(GetPromptRequestParam {
                name: name.to_string(),
                arguments: Some(arguments),
            })
            .await
            .with_context(|| format!("prompts/get failed for {}::{name}", self.id))?;

        let messages = res
            .messages
            .into_iter()
            .map(|m| {
                let role = serde_json::to_value(&m.role)
                    .ok()
                    .and_then(|v| v.as_str().map(ToString::to_string))
                    .unwrap_or_default();
                let text = match &m.content {
                    PromptMessageContent::Text { text } => text.clone(),
                    other => serde_json::to_string(other).unwrap_or_default(),
                };
                PromptMessage { role, text }
            })
            .collect();

        Ok(RenderedPrompt {
            description: res.description,
            messages,
        })
    }
}

/// Outcome of connecting every configured server.
#[derive(Debug, Default)]
pub struct ConnectReport {
    pub connections: ConnectionSet,
    pub failures: Vec<ConnectError>,
}

/// Connect every configured server in declaration order. A server that fails
/// is reported and skipped; there is no retry.
pub async fn connect_all(cfg: &McpConfig) -> ConnectReport {
    let mut report = ConnectReport::default();

    for server in &cfg.mcp_servers {
        tracing::info!(
            name: "mcp.server.connecting",
            server = %server.name,
            target = %server.entry.describe(),
            "Connecting to MCP server"
        );

        match McpSession::connect(&server.name, &server.entry).await {
            Ok(session) => {
                tracing::info!(name: "mcp.server.connected", server = %server.name, "MCP server connected");
                report.connections.push(std::sync::Arc::new(session));
            }
            Err(e) => {
                tracing::warn!(
                    name: "mcp.server.failed",
                    server = %server.name,
                    error = %e,
                    "MCP server unavailable, its capabilities will be absent"
                );
                report.failures.push(e);
            }
        }
    }

    report
}
