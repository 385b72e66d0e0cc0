//! Error types for the PixelForge domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Failed to connect to tool provider '{provider}': {reason}")]
    ConnectionFailed { provider: String, reason: String },

    #[error("Protocol error from '{provider}': {reason}")]
    Protocol { provider: String, reason: String },

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },
}

/// Violations of the conversation's structural invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversationError {
    #[error("The first turn must be a plain originator message")]
    FirstTurnNotOriginator,

    #[error("Turn {index} repeats the role of the previous turn ({role})")]
    NotAlternating { index: usize, role: String },

    #[error("Turn {index} carries tool results without a preceding tool request turn")]
    OrphanedToolResults { index: usize },

    #[error("Turn {index} does not answer the tool requests of the previous turn")]
    UnansweredToolRequests { index: usize },

    #[error("Cannot trim {count} turns from a conversation of {len}")]
    InvalidTrim { count: usize, len: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        };
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = ToolError::ConnectionFailed {
            provider: "figma".into(),
            reason: "connection refused".into(),
        };
        assert!(err.to_string().contains("figma"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn conversation_error_names_index() {
        let err = ConversationError::NotAlternating {
            index: 3,
            role: "assistant".into(),
        };
        assert!(err.to_string().contains("Turn 3"));
    }
}
