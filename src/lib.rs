//! Paper Relay
//!
//! A terminal research assistant that connects to several MCP servers at
//! once, aggregates their tools, resources and prompts into one registry, and
//! lets a hosted model call those tools while the user chats.
//!
//! # Architecture
//!
//! - **MCP Client**: one session per configured server, capability registry
//!   with last-write-wins name resolution, and a router that forwards each
//!   invocation to its owner
//! - **LLM Orchestration**: streaming drivers for Chat Completions and
//!   Anthropic Messages, plus a bounded tool loop
//! - **Chat**: line-oriented REPL with `@topic` and `/prompt` shortcuts
//!
//! # Modules
//!
//! - [`chat`]: Command parsing, REPL and terminal rendering
//! - [`config`]: Layered application configuration
//! - [`llm`]: LLM driver traits, implementations and the orchestrator
//! - [`mcp`]: MCP client configuration, sessions, registry and router
//! - [`normalized`]: Unified streaming event model
//! - [`session`]: Conversation history
//! - [`telemetry`]: Logging setup

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::default_trait_access)]
#![allow(clippy::unused_async)]

pub mod chat;
pub mod config;
pub mod llm;
pub mod mcp;
pub mod normalized;
pub mod session;
pub mod telemetry;
