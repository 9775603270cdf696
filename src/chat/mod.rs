//! Terminal front end.
//!
//! [`Repl`] reads one line at a time, parses it into a [`Command`] and either
//! dispatches it straight to an MCP server (`@topic`, `/prompt`) or hands it
//! to the [`Orchestrator`](crate::llm::Orchestrator) as a model query.

pub mod command;
pub mod repl;
pub mod report;

pub use command::{Command, CommandError};
pub use repl::{Flow, Repl};
