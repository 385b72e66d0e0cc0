//! Domain event system for progress reporting.
//!
//! The controller publishes events as a run advances. The CLI subscribes in
//! verbose mode; nothing in the run depends on anyone listening.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    /// One LLM round trip finished
    TurnCompleted {
        turn: u32,
        tool_requests: usize,
        history_turns: usize,
        timestamp: DateTime<Utc>,
    },

    /// A tool was actually invoked through the bridge
    ToolInvoked {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A tool crossed the duplicate threshold and is blocked for the run
    ToolBlocked {
        tool_name: String,
        timestamp: DateTime<Utc>,
    },

    /// History was rewritten with synthetic turns to force progress
    ConversationRewritten {
        blocked_tools: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// Old turns were dropped to respect the history budget
    HistoryTrimmed {
        removed_turns: usize,
        remaining_chars: usize,
        timestamp: DateTime<Utc>,
    },

    /// Artifacts were persisted
    ArtifactsWritten {
        paths: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// The run ended, successfully or not
    RunFinished {
        status: String,
        files_written: usize,
        turns: u32,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
