//! Run-level errors for the conversation controller.

use pixelforge_core::error::{ConversationError, ProviderError, ToolError};
use thiserror::Error;

/// Failures that end a run.
///
/// Everything below this level (tool failures, unknown tools, unparseable
/// output, escaping paths) is recovered inside the loop.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Tool provider connection failed: {0}")]
    Connection(#[source] ToolError),

    #[error("Turn budget exhausted: no completion within max_turns = {max_turns}")]
    TurnBudgetExhausted { max_turns: u32 },

    #[error("LLM backend error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Conversation invariant violated: {0}")]
    Conversation(#[from] ConversationError),
}

impl AgentError {
    /// Stable short code for summaries and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection_failed",
            Self::TurnBudgetExhausted { .. } => "turn_budget_exhausted",
            Self::Provider(_) => "provider_error",
            Self::Conversation(_) => "conversation_invariant",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_error_names_the_limit() {
        let err = AgentError::TurnBudgetExhausted { max_turns: 7 };
        assert!(err.to_string().contains("max_turns = 7"));
        assert_eq!(err.code(), "turn_budget_exhausted");
    }

    #[test]
    fn provider_error_converts() {
        let err: AgentError = ProviderError::Timeout("30s".into()).into();
        assert!(matches!(err, AgentError::Provider(_)));
        assert!(err.to_string().contains("30s"));
    }
}
