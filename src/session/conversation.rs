// src/session/conversation.rs — Conversation log and citations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry in the conversation log. Mutable in place only while it is the
/// live assistant message of an active session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// One grounding reference returned alongside an answer. The wire encodes
/// the excerpt under `text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub source: String,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default, rename = "text")]
    pub excerpt: Option<String>,
}

impl Citation {
    /// Parse a serialized citation batch. A malformed payload degrades to an
    /// empty set; it never aborts the session.
    pub fn parse_batch(payload: &str) -> Vec<Citation> {
        match serde_json::from_str(payload) {
            Ok(batch) => batch,
            Err(e) => {
                tracing::debug!("discarding malformed sources payload: {e}");
                Vec::new()
            }
        }
    }
}

/// Ordered log of messages plus the citation set for the latest answer.
/// Append-only, except for in-place growth of the single live assistant
/// message and the full reset on a new conversation.
#[derive(Debug, Default)]
pub struct ConversationLog {
    messages: Vec<Message>,
    citations: Vec<Citation>,
    live: Option<usize>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_user(&mut self, text: &str) {
        self.messages.push(Message::new(Role::User, text));
    }

    /// Append a fresh, empty assistant message and mark it live.
    pub fn begin_assistant(&mut self) {
        self.messages.push(Message::new(Role::Assistant, ""));
        self.live = Some(self.messages.len() - 1);
    }

    /// Append a fragment verbatim to the live assistant message.
    /// Returns false when no message is live.
    pub fn append_to_live(&mut self, delta: &str) -> bool {
        match self.live.and_then(|i| self.messages.get_mut(i)) {
            Some(msg) => {
                msg.content.push_str(delta);
                true
            }
            None => false,
        }
    }

    /// Seal the live assistant message. Whatever content it has is final.
    pub fn finalize_live(&mut self) {
        self.live = None;
    }

    pub fn live_content(&self) -> Option<&str> {
        self.live
            .and_then(|i| self.messages.get(i))
            .map(|m| m.content.as_str())
    }

    pub fn set_citations(&mut self, batch: Vec<Citation>) {
        self.citations = batch;
    }

    pub fn clear_citations(&mut self) {
        self.citations.clear();
    }

    pub fn citations(&self) -> &[Citation] {
        &self.citations
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Clear everything. Callers must cancel any active session first so the
    /// live index can't dangle.
    pub fn reset_all(&mut self) {
        self.messages.clear();
        self.citations.clear();
        self.live = None;
    }
}
