//! The shared, append-only conversation threaded through every agent call.

use crate::core::StageKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether agent calls see the accumulated dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Every call receives the prior turns, so later prompts can refer to
    /// earlier answers by name.
    #[default]
    Shared,
    /// Every call is independent; turns are still recorded for the run log.
    Detached,
}

/// A message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// The role (`user` or `assistant`).
    pub role: String,
    /// The message content.
    pub content: String,
}

impl Message {
    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// One completed prompt/response exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// The stage that issued the prompt.
    pub stage: StageKind,
    /// The prompt sent to the agent.
    pub prompt: String,
    /// The agent's final text.
    pub response: String,
    /// When the response arrived.
    pub completed_at: DateTime<Utc>,
}

/// Accumulated dialogue state for one pipeline run.
///
/// Owned by the orchestrator and lent mutably to one step at a time, so there
/// is never more than one writer. Fan-out branches share this single context;
/// it is never cloned per branch.
#[derive(Debug)]
pub struct ConversationContext {
    session_id: Uuid,
    label: String,
    mode: SessionMode,
    turns: Vec<Turn>,
}

impl ConversationContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new(label: impl Into<String>, mode: SessionMode) -> Self {
        Self {
            session_id: Uuid::now_v7(),
            label: label.into(),
            mode,
            turns: Vec::new(),
        }
    }

    /// Returns the session ID.
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Returns the session label (the session owner).
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the session mode.
    #[must_use]
    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Returns the recorded turns in order.
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Returns the number of recorded turns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Returns true if nothing has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Returns the history to send with the next call, or `None` when the
    /// session is detached.
    #[must_use]
    pub fn history(&self) -> Option<Vec<Message>> {
        match self.mode {
            SessionMode::Detached => None,
            SessionMode::Shared => Some(
                self.turns
                    .iter()
                    .flat_map(|t| [Message::user(&t.prompt), Message::assistant(&t.response)])
                    .collect(),
            ),
        }
    }

    /// Appends a completed exchange.
    pub fn record(
        &mut self,
        stage: StageKind,
        prompt: impl Into<String>,
        response: impl Into<String>,
    ) {
        self.turns.push(Turn {
            stage,
            prompt: prompt.into(),
            response: response.into(),
            completed_at: Utc::now(),
        });
    }
}
