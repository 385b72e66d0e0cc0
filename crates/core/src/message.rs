//! Turn and Conversation domain types.
//!
//! A conversation is an append-only log of turns exchanged between the
//! task originator (`User`) and the responder (`Assistant`). The log enforces
//! its structural invariants on every mutation:
//!
//! - turn 0 is a plain originator message (the task descriptor)
//! - roles strictly alternate
//! - a tool-results turn immediately follows, and fully answers, the
//!   tool-request turn it belongs to
//! - trimming removes whole request/answer pairs and never turn 0

use crate::error::ConversationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Unique identifier for a conversation (one per run).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a turn in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The task originator (the controller, on behalf of the caller)
    User,
    /// The responder (the LLM)
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Unique ID for this call (matches the backend's tool call id)
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as a JSON string, exactly as the model produced them
    pub arguments: String,
}

impl ToolRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Parse the arguments into a JSON value.
    ///
    /// Blank arguments become an empty object; unparseable arguments are
    /// passed through as a JSON string so the provider can report them.
    pub fn arguments_value(&self) -> serde_json::Value {
        if self.arguments.trim().is_empty() {
            return serde_json::Value::Object(serde_json::Map::new());
        }
        serde_json::from_str(&self.arguments)
            .unwrap_or_else(|_| serde_json::Value::String(self.arguments.clone()))
    }
}

/// The answer to one tool request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultEntry {
    /// The request id this result answers
    pub call_id: String,

    /// The tool that was requested
    pub tool_name: String,

    /// Result text (already size-capped by the controller)
    pub content: String,

    /// Whether the result describes a failure
    #[serde(default)]
    pub is_error: bool,
}

/// What a turn carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnPayload {
    /// Free text
    Text { text: String },

    /// Tool invocation requests, with any text the model emitted alongside
    ToolRequests {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        text: String,
        requests: Vec<ToolRequest>,
    },

    /// Results answering the previous turn's requests
    ToolResults { results: Vec<ToolResultEntry> },
}

/// A single turn in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Who produced this turn
    pub role: Role,

    /// The turn content
    pub payload: TurnPayload,

    /// Timestamp
    pub timestamp: DateTime<Utc>,

    /// True when the controller fabricated this turn instead of relaying real output
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub synthetic: bool,
}

impl Turn {
    fn new(role: Role, payload: TurnPayload) -> Self {
        Self {
            role,
            payload,
            timestamp: Utc::now(),
            synthetic: false,
        }
    }

    /// Create an originator text turn.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, TurnPayload::Text { text: text.into() })
    }

    /// Create a responder text turn.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, TurnPayload::Text { text: text.into() })
    }

    /// Create a responder turn carrying tool requests.
    pub fn tool_requests(text: impl Into<String>, requests: Vec<ToolRequest>) -> Self {
        Self::new(
            Role::Assistant,
            TurnPayload::ToolRequests {
                text: text.into(),
                requests,
            },
        )
    }

    /// Create the originator turn answering a tool-request turn.
    pub fn tool_results(results: Vec<ToolResultEntry>) -> Self {
        Self::new(Role::User, TurnPayload::ToolResults { results })
    }

    /// Mark this turn as fabricated by the controller.
    pub fn synthetic(mut self) -> Self {
        self.synthetic = true;
        self
    }

    /// The free text of this turn, if any.
    pub fn text(&self) -> &str {
        match &self.payload {
            TurnPayload::Text { text } | TurnPayload::ToolRequests { text, .. } => text,
            TurnPayload::ToolResults { .. } => "",
        }
    }

    /// Approximate size in characters.
    ///
    /// Text turns count their characters; tool structures are measured by
    /// their serialized size.
    pub fn size_chars(&self) -> usize {
        match &self.payload {
            TurnPayload::Text { text } => text.chars().count(),
            other => serde_json::to_string(other)
                .map(|s| s.chars().count())
                .unwrap_or_else(|_| self.text().chars().count()),
        }
    }
}

/// An invariant-checked, append-only log of turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,

    /// Ordered turns (private: mutate through `push` and `trim_front`)
    turns: Vec<Turn>,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// When the last mutation happened
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new empty conversation.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a conversation seeded with the task message.
    pub fn with_task(task: impl Into<String>) -> Self {
        let mut conversation = Self::new();
        conversation.turns.push(Turn::user(task));
        conversation
    }

    /// Append a turn, enforcing alternation and request/result pairing.
    pub fn push(&mut self, turn: Turn) -> Result<(), ConversationError> {
        let index = self.turns.len();

        match self.turns.last() {
            None => {
                if turn.role != Role::User || !matches!(turn.payload, TurnPayload::Text { .. }) {
                    return Err(ConversationError::FirstTurnNotOriginator);
                }
            }
            Some(previous) => {
                if previous.role == turn.role {
                    return Err(ConversationError::NotAlternating {
                        index,
                        role: turn.role.to_string(),
                    });
                }

                match (&previous.payload, &turn.payload) {
                    (
                        TurnPayload::ToolRequests { requests, .. },
                        TurnPayload::ToolResults { results },
                    ) => {
                        let asked: BTreeSet<&str> = requests.iter().map(|r| r.id.as_str()).collect();
                        let answered: BTreeSet<&str> =
                            results.iter().map(|r| r.call_id.as_str()).collect();
                        if asked != answered || results.len() != requests.len() {
                            return Err(ConversationError::UnansweredToolRequests { index });
                        }
                    }
                    (TurnPayload::ToolRequests { .. }, _) => {
                        return Err(ConversationError::UnansweredToolRequests { index });
                    }
                    (_, TurnPayload::ToolResults { .. }) => {
                        return Err(ConversationError::OrphanedToolResults { index });
                    }
                    _ => {}
                }
            }
        }

        self.updated_at = Utc::now();
        self.turns.push(turn);
        Ok(())
    }

    /// Remove `count` turns directly after the task turn.
    ///
    /// `count` must be even and leave the task turn in place, so every
    /// removed responder turn takes its answer with it.
    pub fn trim_front(&mut self, count: usize) -> Result<usize, ConversationError> {
        if count == 0 {
            return Ok(0);
        }
        if count % 2 != 0 || count >= self.turns.len() {
            return Err(ConversationError::InvalidTrim {
                count,
                len: self.turns.len(),
            });
        }
        self.turns.drain(1..=count);
        self.updated_at = Utc::now();
        Ok(count)
    }

    /// All turns in order.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// The task turn.
    pub fn first(&self) -> Option<&Turn> {
        self.turns.first()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Total size estimate in characters.
    pub fn estimated_chars(&self) -> usize {
        self.turns.iter().map(Turn::size_chars).sum()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
