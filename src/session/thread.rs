//! Conversation thread.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::llm::{ToolCall, Turn};

/// A single conversation.
///
/// The history is append-only: turns are never edited or removed, and a
/// failed model call leaves whatever was already appended in place. Clones
/// share the same history.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    id: String,
    started_at: DateTime<Utc>,
    turns: RwLock<Vec<Turn>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Start an empty conversation with a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    /// Start an empty conversation with the given id.
    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id: id.into(),
                started_at: Utc::now(),
                turns: RwLock::new(Vec::new()),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }

    pub fn add_user_message(&self, content: impl Into<String>) {
        self.push(Turn::User {
            content: content.into(),
        });
    }

    pub fn add_assistant_message(&self, content: impl Into<String>) {
        self.push(Turn::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
        });
    }

    /// Assistant turn that requested tools. Must be followed by one
    /// [`Self::add_tool_result`] per call.
    pub fn add_assistant_with_tool_calls(&self, content: impl Into<String>, tool_calls: Vec<ToolCall>) {
        self.push(Turn::Assistant {
            content: content.into(),
            tool_calls,
        });
    }

    pub fn add_tool_result(
        &self,
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) {
        self.push(Turn::ToolResult {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            content: content.into(),
            is_error,
        });
    }

    /// Snapshot of the history.
    #[must_use]
    pub fn turns(&self) -> Vec<Turn> {
        self.inner
            .turns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn turn_count(&self) -> usize {
        self.inner
            .turns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn push(&self, turn: Turn) {
        self.inner
            .turns
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(turn);
    }
}
