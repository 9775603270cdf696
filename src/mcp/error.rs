use crate::mcp::capability::{CapabilityKind, ConnectionId};

/// Errors surfaced by capability resolution and dispatch.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No connection advertises the requested capability. No server was
    /// contacted.
    #[error("{kind} '{name}' not found")]
    NotFound { kind: CapabilityKind, name: String },

    /// The registry points at a connection the router does not hold.
    #[error("no live connection '{connection}' for {kind} '{name}'")]
    MissingConnection {
        kind: CapabilityKind,
        name: String,
        connection: ConnectionId,
    },

    /// The backing server (or its transport) failed the call. The error is
    /// passed through as-is.
    #[error("{kind} '{name}' failed on '{connection}': {error:#}")]
    Invocation {
        kind: CapabilityKind,
        name: String,
        connection: ConnectionId,
        error: anyhow::Error,
    },
}

impl DispatchError {
    pub fn not_found(kind: CapabilityKind, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Short label used for metrics and logs.
    #[must_use]
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::MissingConnection { .. } => "missing_connection",
            Self::Invocation { .. } => "invocation_failed",
        }
    }
}
