//! Model Context Protocol (MCP) client side.
//!
//! Connects to any number of stdio or streamable-HTTP MCP servers, merges
//! what they advertise into one [`registry::CapabilityRegistry`] and routes
//! calls through [`router::Router`].
//!
//! # Configuration
//!
//! Servers are listed in `server_config.json`:
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "research": {
//!       "command": "uv",
//!       "args": ["run", "research_server.py"]
//!     },
//!     "remote": {
//!       "url": "https://mcp.example.com/mcp?key=${REMOTE_KEY}"
//!     }
//!   }
//! }
//! ```
//!
//! # Name collisions
//!
//! Capability names are not namespaced. If two servers advertise the same
//! tool, resource or prompt name, the server declared later owns it.

pub mod capability;
pub mod config;
pub mod connection;
pub mod error;
pub mod registry;
pub mod router;
pub mod session;

pub use capability::{CapabilityKind, ConnectionId, Invocation, InvocationResult};
pub use connection::{Connection, ConnectionSet};
pub use error::DispatchError;
pub use registry::CapabilityRegistry;
pub use router::Router;
