//! Capability dispatch.
//!
//! [`Router::dispatch`] resolves an [`Invocation`] through the registry and
//! forwards it to the owning connection. One invocation is exactly one round
//! trip; results and errors come back untouched.

use std::sync::Arc;
use std::time::Instant;

use crate::mcp::capability::{ConnectionId, Invocation, InvocationResult};
use crate::mcp::connection::{Connection, ConnectionSet};
use crate::mcp::error::DispatchError;
use crate::mcp::registry::CapabilityRegistry;

#[derive(Debug, Clone)]
pub struct Router {
    registry: Arc<CapabilityRegistry>,
    connections: ConnectionSet,
}

impl Router {
    pub fn new(registry: Arc<CapabilityRegistry>, connections: ConnectionSet) -> Self {
        Self {
            registry,
            connections,
        }
    }

    /// Connect nothing, route nothing. Every dispatch is `NotFound`.
    #[must_use]
    pub fn new_empty() -> Self {
        Self::new(Arc::new(CapabilityRegistry::new_empty()), ConnectionSet::new())
    }

    /// Query every connection and build the router around the resulting
    /// registry.
    pub async fn from_connections(connections: ConnectionSet) -> Self {
        let registry = CapabilityRegistry::refresh(connections.as_slice()).await;
        Self::new(Arc::new(registry), connections)
    }

    #[must_use]
    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    #[must_use]
    pub fn connections(&self) -> &ConnectionSet {
        &self.connections
    }

    /// Shut down every connection, in configuration order.
    pub fn close_all(&self) {
        for connection in self.connections.as_slice() {
            connection.close();
            tracing::debug!(connection = %connection.id(), "Closed MCP session");
        }
    }

    /// Resolve `invocation` and forward it to the owning connection.
    pub async fn dispatch(
        &self,
        invocation: Invocation,
    ) -> Result<InvocationResult, DispatchError> {
        let kind = invocation.kind();
        let name = invocation.name().to_string();

        let connection = match self.route(&invocation) {
            Ok(c) => c,
            Err(e) => {
                tracing::info!(
                    name: "mcp.dispatch.unresolved",
                    kind = %kind,
                    capability = %name,
                    "No server advertises capability"
                );
                record(kind.as_str(), e.outcome());
                return Err(e);
            }
        };
        let owner = connection.id().clone();

        tracing::debug!(
            name: "mcp.dispatch.start",
            kind = %kind,
            capability = %name,
            server = %owner,
            "Dispatching"
        );
        let started = Instant::now();

        let result = match invocation {
            Invocation::Tool { name, arguments } => connection
                .call_tool(&name, arguments)
                .await
                .map(InvocationResult::Tool),
            Invocation::Resource { uri } => connection
                .read_resource(&uri)
                .await
                .map(InvocationResult::Resource),
            Invocation::Prompt { name, arguments } => connection
                .get_prompt(&name, arguments)
                .await
                .map(InvocationResult::Prompt),
        };

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match result {
            Ok(result) => {
                tracing::info!(
                    name: "mcp.dispatch.ok",
                    kind = %kind,
                    capability = %name,
                    server = %owner,
                    elapsed_ms,
                    "Dispatch succeeded"
                );
                record(kind.as_str(), "ok");
                Ok(result)
            }
            Err(error) => {
                tracing::warn!(
                    name: "mcp.dispatch.failed",
                    kind = %kind,
                    capability = %name,
                    server = %owner,
                    elapsed_ms,
                    error = %error,
                    "Dispatch failed"
                );
                let err = DispatchError::Invocation {
                    kind,
                    name,
                    connection: owner,
                    error,
                };
                record(kind.as_str(), err.outcome());
                Err(err)
            }
        }
    }

    /// Which connection an invocation would go to, without sending it.
    pub fn route(&self, invocation: &Invocation) -> Result<&Arc<dyn Connection>, DispatchError> {
        let kind = invocation.kind();
        let name = invocation.name();
        let owner: &ConnectionId = self.registry.resolve(kind, name)?;

        self.connections
            .get(owner)
            .ok_or_else(|| DispatchError::MissingConnection {
                kind,
                name: name.to_string(),
                connection: owner.clone(),
            })
    }
}

fn record(kind: &'static str, outcome: &'static str) {
    metrics::counter!("mcp_dispatch_total", "kind" => kind, "outcome" => outcome).increment(1);
}
