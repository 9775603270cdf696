//! Aggregated capability registry.
//!
//! Built once from an ordered list of connections. Every tool, resource,
//! resource template and prompt name maps to exactly one [`ConnectionId`]:
//! when two connections advertise the same name, the one registered later
//! wins and the earlier entry is dropped without error.

use std::collections::HashMap;
use std::sync::Arc;

use crate::mcp::capability::{
    CapabilityDescriptor, CapabilityKind, ConnectionId, PromptDescriptor, ResourceDescriptor,
    ResourceTemplateDescriptor, ToolDescriptor,
};
use crate::mcp::connection::Connection;
use crate::mcp::error::DispatchError;

/// Everything one connection advertised at refresh time.
#[derive(Debug, Clone, Default)]
pub struct Advertised {
    pub tools: Vec<ToolDescriptor>,
    pub resources: Vec<ResourceDescriptor>,
    pub resource_templates: Vec<ResourceTemplateDescriptor>,
    pub prompts: Vec<PromptDescriptor>,
    /// Listing failures, one line per capability kind that could not be
    /// queried.
    pub errors: Vec<String>,
}

impl Advertised {
    /// Query every capability kind on `connection`. A kind whose listing
    /// fails contributes nothing; the failure is kept in `errors`.
    pub async fn query(connection: &dyn Connection) -> Self {
        let mut out = Self::default();
        let server = connection.id();

        match connection.list_tools().await {
            Ok(tools) => out.tools = tools,
            Err(e) => out.record(server, CapabilityKind::Tool, &e),
        }
        match connection.list_resources().await {
            Ok(resources) => out.resources = resources,
            Err(e) => out.record(server, CapabilityKind::Resource, &e),
        }
        match connection.list_resource_templates().await {
            Ok(templates) => out.resource_templates = templates,
            Err(e) => out.record(server, CapabilityKind::Resource, &e),
        }
        match connection.list_prompts().await {
            Ok(prompts) => out.prompts = prompts,
            Err(e) => out.record(server, CapabilityKind::Prompt, &e),
        }

        out
    }

    fn record(&mut self, server: &ConnectionId, kind: CapabilityKind, error: &anyhow::Error) {
        tracing::warn!(
            name: "mcp.capabilities.list_failed",
            server = %server,
            kind = %kind,
            error = %error,
            "Capability listing failed"
        );
        self.errors.push(format!("{kind}: {error:#}"));
    }
}

/// Name-keyed table that remembers first-seen order for listings while the
/// owner of each name follows the last write.
#[derive(Debug, Clone)]
struct Table<D> {
    entries: Vec<(D, ConnectionId)>,
    index: HashMap<String, usize>,
}

impl<D> Default for Table<D> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<D> Table<D> {
    /// Insert or overwrite. Returns the previous owner when a name is
    /// shadowed.
    fn insert(&mut self, name: &str, descriptor: D, owner: ConnectionId) -> Option<ConnectionId> {
        if let Some(&pos) = self.index.get(name) {
            let previous = std::mem::replace(&mut self.entries[pos], (descriptor, owner));
            Some(previous.1)
        } else {
            self.index.insert(name.to_string(), self.entries.len());
            self.entries.push((descriptor, owner));
            None
        }
    }

    fn owner(&self, name: &str) -> Option<&ConnectionId> {
        self.index.get(name).map(|&pos| &self.entries[pos].1)
    }

    fn iter(&self) -> impl Iterator<Item = &(D, ConnectionId)> {
        self.entries.iter()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// A parsed level-1 URI template such as `papers://{topic}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriTemplate {
    raw: String,
    parts: Vec<TemplatePart>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TemplatePart {
    Literal(String),
    Var(String),
}

impl UriTemplate {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let mut parts = Vec::new();
        let mut rest = raw;

        while let Some(open) = rest.find('{') {
            let Some(close) = rest[open..].find('}').map(|c| open + c) else {
                break;
            };
            if open > 0 {
                parts.push(TemplatePart::Literal(rest[..open].to_string()));
            }
            parts.push(TemplatePart::Var(rest[open + 1..close].to_string()));
            rest = &rest[close + 1..];
        }
        if !rest.is_empty() {
            parts.push(TemplatePart::Literal(rest.to_string()));
        }

        Self {
            raw: raw.to_string(),
            parts,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Match `uri` against the template, returning the bound variables.
    /// Each variable binds a non-empty run without `/`.
    #[must_use]
    pub fn matches(&self, uri: &str) -> Option<HashMap<String, String>> {
        let mut vars = HashMap::new();
        let mut rest = uri;
        let mut parts = self.parts.iter().peekable();

        while let Some(part) = parts.next() {
            match part {
                TemplatePart::Literal(lit) => {
                    rest = rest.strip_prefix(lit.as_str())?;
                }
                TemplatePart::Var(name) => {
                    let end = match parts.peek() {
                        Some(TemplatePart::Literal(next)) => rest.find(next.as_str())?,
                        _ => rest.len(),
                    };
                    let value = &rest[..end];
                    if value.is_empty() || value.contains('/') {
                        return None;
                    }
                    vars.insert(name.clone(), value.to_string());
                    rest = &rest[end..];
                }
            }
        }

        rest.is_empty().then_some(vars)
    }
}

/// What one connection contributed, for the startup report.
#[derive(Debug, Clone)]
pub struct ConnectionSummary {
    pub connection: ConnectionId,
    pub tools: Vec<String>,
    pub resources: Vec<String>,
    pub prompts: Vec<String>,
    pub errors: Vec<String>,
}

/// Incremental construction of a [`CapabilityRegistry`].
///
/// Registration order is the collision policy: a later `register` call
/// overwrites names an earlier one inserted.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    tools: Table<ToolDescriptor>,
    resources: Table<ResourceDescriptor>,
    templates: Vec<(UriTemplate, ResourceTemplateDescriptor, ConnectionId)>,
    prompts: Table<PromptDescriptor>,
    summaries: Vec<ConnectionSummary>,
}

impl RegistryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, connection: &ConnectionId, advertised: Advertised) -> &mut Self {
        let mut summary = ConnectionSummary {
            connection: connection.clone(),
            tools: Vec::with_capacity(advertised.tools.len()),
            resources: Vec::with_capacity(
                advertised.resources.len() + advertised.resource_templates.len(),
            ),
            prompts: Vec::with_capacity(advertised.prompts.len()),
            errors: advertised.errors,
        };

        for tool in advertised.tools {
            let name = tool.name.clone();
            let previous = self.tools.insert(&name, tool, connection.clone());
            log_shadowed(CapabilityKind::Tool, &name, previous, connection);
            summary.tools.push(name);
        }

        for resource in advertised.resources {
            let uri = resource.uri.clone();
            let previous = self.resources.insert(&uri, resource, connection.clone());
            log_shadowed(CapabilityKind::Resource, &uri, previous, connection);
            summary.resources.push(uri);
        }

        for template in advertised.resource_templates {
            let raw = template.uri_template.clone();
            // Re-registering a template moves it to the back so the newest
            // owner is matched first.
            let previous = self
                .templates
                .iter()
                .position(|(t, _, _)| t.as_str() == raw)
                .map(|pos| self.templates.remove(pos).2);
            log_shadowed(CapabilityKind::Resource, &raw, previous, connection);
            self.templates
                .push((UriTemplate::parse(&raw), template, connection.clone()));
            summary.resources.push(raw);
        }

        for prompt in advertised.prompts {
            let name = prompt.name.clone();
            let previous = self.prompts.insert(&name, prompt, connection.clone());
            log_shadowed(CapabilityKind::Prompt, &name, previous, connection);
            summary.prompts.push(name);
        }

        self.summaries.push(summary);
        self
    }

    #[must_use]
    pub fn build(self) -> CapabilityRegistry {
        CapabilityRegistry {
            tools: self.tools,
            resources: self.resources,
            templates: self.templates,
            prompts: self.prompts,
            summaries: self.summaries,
        }
    }
}

fn log_shadowed(
    kind: CapabilityKind,
    name: &str,
    previous: Option<ConnectionId>,
    winner: &ConnectionId,
) {
    if let Some(previous) = previous {
        tracing::debug!(
            name: "mcp.capability.shadowed",
            kind = %kind,
            capability = %name,
            previous = %previous,
            winner = %winner,
            "Capability name registered again, later server wins"
        );
    }
}

/// Immutable name → connection mappings for tools, resources and prompts.
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    tools: Table<ToolDescriptor>,
    resources: Table<ResourceDescriptor>,
    templates: Vec<(UriTemplate, ResourceTemplateDescriptor, ConnectionId)>,
    prompts: Table<PromptDescriptor>,
    summaries: Vec<ConnectionSummary>,
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("tool_count", &self.tools.len())
            .field("resource_count", &self.resources.len())
            .field("template_count", &self.templates.len())
            .field("prompt_count", &self.prompts.len())
            .field("connection_count", &self.summaries.len())
            .finish()
    }
}

impl CapabilityRegistry {
    /// Query every connection in order and build the registry.
    pub async fn refresh(connections: &[Arc<dyn Connection>]) -> Self {
        let mut builder = RegistryBuilder::new();
        for connection in connections {
            let advertised = Advertised::query(connection.as_ref()).await;
            tracing::info!(
                name: "mcp.capabilities.listed",
                server = %connection.id(),
                tools = advertised.tools.len(),
                resources = advertised.resources.len(),
                resource_templates = advertised.resource_templates.len(),
                prompts = advertised.prompts.len(),
                "Capabilities listed"
            );
            builder.register(connection.id(), advertised);
        }
        builder.build()
    }

    /// Creates an empty registry.
    #[must_use]
    pub fn new_empty() -> Self {
        Self::default()
    }

    /// Owning connection of a capability.
    ///
    /// Resources resolve by exact URI first, then against templates from the
    /// most recently registered backwards.
    pub fn resolve(&self, kind: CapabilityKind, name: &str) -> Result<&ConnectionId, DispatchError> {
        let found = match kind {
            CapabilityKind::Tool => self.tools.owner(name),
            CapabilityKind::Prompt => self.prompts.owner(name),
            CapabilityKind::Resource => self.resources.owner(name).or_else(|| {
                self.templates
                    .iter()
                    .rev()
                    .find(|(t, _, _)| t.matches(name).is_some())
                    .map(|(_, _, owner)| owner)
            }),
        };
        found.ok_or_else(|| DispatchError::not_found(kind, name))
    }

    /// Descriptor form of [`Self::resolve`].
    pub fn describe(
        &self,
        kind: CapabilityKind,
        name: &str,
    ) -> Result<CapabilityDescriptor, DispatchError> {
        self.resolve(kind, name).map(|owner| CapabilityDescriptor {
            name: name.to_string(),
            connection: owner.clone(),
            kind,
        })
    }

    /// One schema per distinct tool name, from the winning connection.
    pub fn tools(&self) -> impl Iterator<Item = (&ToolDescriptor, &ConnectionId)> {
        self.tools.iter().map(|(d, c)| (d, c))
    }

    pub fn prompts(&self) -> impl Iterator<Item = (&PromptDescriptor, &ConnectionId)> {
        self.prompts.iter().map(|(d, c)| (d, c))
    }

    pub fn resources(&self) -> impl Iterator<Item = (&ResourceDescriptor, &ConnectionId)> {
        self.resources.iter().map(|(d, c)| (d, c))
    }

    pub fn resource_templates(
        &self,
    ) -> impl Iterator<Item = (&ResourceTemplateDescriptor, &ConnectionId)> {
        self.templates.iter().map(|(_, d, c)| (d, c))
    }

    /// Per-connection contributions in registration order.
    #[must_use]
    pub fn summaries(&self) -> &[ConnectionSummary] {
        &self.summaries
    }

    #[must_use]
    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn prompt_count(&self) -> usize {
        self.prompts.len()
    }
}
