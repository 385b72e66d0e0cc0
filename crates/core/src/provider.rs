//! Provider trait, the abstraction over LLM backends.
//!
//! A Provider knows how to send the running conversation to an LLM and get
//! back the assistant's content: text segments and, possibly, tool
//! invocation requests.
//!
//! Implementations: OpenAI-compatible endpoints (including local servers
//! such as Ollama) and the native Anthropic Messages API.

use crate::error::ProviderError;
use crate::message::{ToolRequest, Turn};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One request to the LLM backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "qwen2.5-coder:14b", "claude-sonnet-4-20250514")
    pub model: String,

    /// System instructions, sent outside the turn list
    pub system_prompt: String,

    /// The conversation turns
    pub turns: Vec<Turn>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Tool schema offered to the model.
    ///
    /// `None` means the model is given no tools at all for this call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
}

fn default_temperature() -> f32 {
    0.2
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A complete response from a provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Text content blocks, in order
    #[serde(default)]
    pub text_segments: Vec<String>,

    /// Tool invocation requests, in order
    #[serde(default)]
    pub tool_requests: Vec<ToolRequest>,

    /// Token usage statistics
    #[serde(default)]
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    #[serde(default)]
    pub model: String,
}

impl ProviderResponse {
    /// A text-only response.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text_segments: vec![text.into()],
            ..Self::default()
        }
    }

    /// All text segments joined with newlines.
    pub fn joined_text(&self) -> String {
        self.text_segments.join("\n")
    }
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The core Provider trait.
///
/// The controller calls `complete()` without knowing which backend is in
/// use. Whether tools are offered is decided per call through
/// `ProviderRequest::tools`.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "ollama", "anthropic").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError>;
}
