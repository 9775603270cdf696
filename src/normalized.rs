//! Normalized event types for streaming LLM responses.
//!
//! This module defines a unified event model that abstracts over the
//! supported LLM protocols (Chat Completions, Anthropic Messages) and gives
//! the terminal front end one consistent stream to render.
//!
//! # Event Types
//!
//! - Message deltas for incremental text output
//! - Tool call lifecycle (delta, complete, result)
//! - Stream lifecycle (start, done, error)
//!
//! # Example
//!
//! ```rust
//! use paper_relay::normalized::NormalizedEvent;
//!
//! let event = NormalizedEvent::MessageDelta {
//!     text: "Hello".to_string(),
//! };
//! assert_eq!(event.name(), "message.delta");
//! ```

use serde::{Deserialize, Serialize};

/// Normalized streaming events emitted by drivers and the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum NormalizedEvent {
    // ─────────────────────────────────────────────────────────────────────
    // Stream Lifecycle
    // ─────────────────────────────────────────────────────────────────────
    /// Indicates the start of a new cycle.
    #[serde(rename = "stream.start")]
    StreamStart {
        /// Unique identifier for this user input cycle.
        request_id: String,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Message Content
    // ─────────────────────────────────────────────────────────────────────
    /// Incremental text delta from the assistant's response.
    #[serde(rename = "message.delta")]
    MessageDelta {
        /// The text fragment to append.
        text: String,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Tool Calls
    // ─────────────────────────────────────────────────────────────────────
    /// Incremental tool call delta (streaming tool call assembly).
    #[serde(rename = "tool_call.delta")]
    ToolCallDelta {
        /// Index of this tool call in the current batch.
        call_index: usize,
        /// Tool call ID (may arrive in first delta or later).
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        /// Tool/function name (may arrive in first delta or later).
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        /// Incremental arguments JSON fragment.
        #[serde(skip_serializing_if = "Option::is_none")]
        arguments_delta: Option<String>,
    },

    /// Tool call is fully assembled and ready for execution.
    #[serde(rename = "tool_call.complete")]
    ToolCallComplete {
        /// Index of this tool call in the current batch.
        call_index: usize,
        /// Tool call ID.
        id: String,
        /// Tool name.
        name: String,
        /// Complete arguments as JSON string.
        arguments_json: String,
    },

    /// Result from executing a tool.
    #[serde(rename = "tool_result")]
    ToolResult {
        /// Tool call ID this result corresponds to.
        id: String,
        /// Tool name.
        name: String,
        /// Result content as fed back to the model.
        content: String,
        /// Whether the tool execution succeeded.
        #[serde(default = "default_true")]
        success: bool,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Errors and Completion
    // ─────────────────────────────────────────────────────────────────────
    /// An error occurred during the cycle.
    #[serde(rename = "error")]
    Error {
        /// Error message.
        message: String,
        /// Optional error code for programmatic handling.
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },

    /// The cycle (or a single driver stream) has completed.
    #[serde(rename = "done")]
    Done,
}

fn default_true() -> bool {
    true
}

impl NormalizedEvent {
    /// Stable dotted name of the event type.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::StreamStart { .. } => "stream.start",
            Self::MessageDelta { .. } => "message.delta",
            Self::ToolCallDelta { .. } => "tool_call.delta",
            Self::ToolCallComplete { .. } => "tool_call.complete",
            Self::ToolResult { .. } => "tool_result",
            Self::Error { .. } => "error",
            Self::Done => "done",
        }
    }

    /// Shorthand for an [`NormalizedEvent::Error`] without a code.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            code: None,
        }
    }
}
