//! The connection handle seam.
//!
//! A [`Connection`] wraps exactly one live session to one server. The
//! registry only ever stores [`ConnectionId`]s; the handles themselves are
//! owned by a [`ConnectionSet`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;

use crate::mcp::capability::{
    ConnectionId, PromptDescriptor, RenderedPrompt, ResourceContent, ResourceDescriptor,
    ResourceTemplateDescriptor, ToolDescriptor, ToolOutput,
};

#[async_trait]
pub trait Connection: Send + Sync + std::fmt::Debug {
    fn id(&self) -> &ConnectionId;

    async fn list_tools(&self) -> anyhow::Result<Vec<ToolDescriptor>>;

    async fn list_resources(&self) -> anyhow::Result<Vec<ResourceDescriptor>>;

    /// Servers without templates return an empty list.
    async fn list_resource_templates(&self) -> anyhow::Result<Vec<ResourceTemplateDescriptor>> {
        Ok(Vec::new())
    }

    async fn list_prompts(&self) -> anyhow::Result<Vec<PromptDescriptor>>;

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> anyhow::Result<ToolOutput>;

    async fn read_resource(&self, uri: &str) -> anyhow::Result<Vec<ResourceContent>>;

    async fn get_prompt(
        &self,
        name: &str,
        arguments: BTreeMap<String, String>,
    ) -> anyhow::Result<RenderedPrompt>;

    /// Ask the server session to shut down. Calls made afterwards fail.
    fn close(&self) {}
}

/// Owner of every live connection, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct ConnectionSet {
    ordered: Vec<Arc<dyn Connection>>,
    by_id: HashMap<ConnectionId, Arc<dyn Connection>>,
}

impl ConnectionSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection. A second connection with the same id replaces the
    /// first but keeps its position.
    pub fn push(&mut self, connection: Arc<dyn Connection>) {
        let id = connection.id().clone();
        if let Some(slot) = self.ordered.iter_mut().find(|c| c.id() == &id) {
            *slot = Arc::clone(&connection);
        } else {
            self.ordered.push(Arc::clone(&connection));
        }
        self.by_id.insert(id, connection);
    }

    #[must_use]
    pub fn get(&self, id: &ConnectionId) -> Option<&Arc<dyn Connection>> {
        self.by_id.get(id)
    }

    /// Connections in registration order.
    #[must_use]
    pub fn as_slice(&self) -> &[Arc<dyn Connection>] {
        &self.ordered
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

impl FromIterator<Arc<dyn Connection>> for ConnectionSet {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Connection>>>(iter: I) -> Self {
        let mut set = Self::new();
        for connection in iter {
            set.push(connection);
        }
        set
    }
}
