//! Tool provider trait, the abstraction over external tool sources.
//!
//! A tool provider is an external system (a design-source connector, a
//! component catalog, ...) that exposes named tools with JSON-schema
//! parameters. Providers are plugged in per deployment, so tool identity is
//! resolved at runtime through discovery.

use crate::error::ToolError;
use crate::provider::ToolDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A tool discovered from a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique name within a bridge
    pub name: String,

    /// Human-readable description (sent to the LLM)
    #[serde(default)]
    pub description: String,

    /// JSON Schema for the arguments (object with properties and required subset)
    pub input_schema: serde_json::Value,

    /// Name of the provider that owns this tool
    pub provider: String,
}

impl ToolDescriptor {
    /// Convert this descriptor into a ToolDefinition for sending to the LLM.
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.input_schema.clone(),
        }
    }

    /// Names of the required parameters declared by the schema.
    pub fn required_params(&self) -> Vec<&str> {
        self.input_schema["required"]
            .as_array()
            .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default()
    }
}

/// The normalized result of a bridge invocation.
///
/// Failures are data, not exceptions: the controller feeds them back into
/// the conversation so the model can adapt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// Result text, or a structured JSON error payload
    pub text: String,

    /// Whether `text` is an error payload
    pub is_error: bool,
}

impl ToolOutcome {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}

/// The core ToolProvider trait.
///
/// Implemented once per transport (stdio child process, HTTP). The
/// controller and loop-breaker only ever see this trait.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// The configured name of this provider (e.g., "figma", "storybook").
    fn name(&self) -> &str;

    /// List the tools this provider offers.
    async fn discover(&self) -> std::result::Result<Vec<ToolDescriptor>, ToolError>;

    /// Invoke a tool and return its textual output.
    async fn invoke(
        &self,
        tool: &str,
        arguments: serde_json::Value,
    ) -> std::result::Result<String, ToolError>;

    /// Release the underlying connection.
    async fn close(&self) -> std::result::Result<(), ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoProvider;

    #[async_trait]
    impl ToolProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn discover(&self) -> std::result::Result<Vec<ToolDescriptor>, ToolError> {
            Ok(vec![ToolDescriptor {
                name: "echo".into(),
                description: "Echoes back the input".into(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": { "text": { "type": "string" } },
                    "required": ["text"]
                }),
                provider: "echo".into(),
            }])
        }

        async fn invoke(
            &self,
            _tool: &str,
            arguments: serde_json::Value,
        ) -> std::result::Result<String, ToolError> {
            arguments["text"]
                .as_str()
                .map(String::from)
                .ok_or_else(|| ToolError::ExecutionFailed {
                    tool_name: "echo".into(),
                    reason: "missing 'text'".into(),
                })
        }

        async fn close(&self) -> std::result::Result<(), ToolError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn descriptor_converts_to_definition() {
        let tools = EchoProvider.discover().await.unwrap();
        let def = tools[0].to_definition();
        assert_eq!(def.name, "echo");
        assert_eq!(def.parameters["required"], serde_json::json!(["text"]));
        assert_eq!(tools[0].required_params(), vec!["text"]);
    }

    #[tokio::test]
    async fn provider_invoke_roundtrip() {
        let out = EchoProvider
            .invoke("echo", serde_json::json!({"text": "hello"}))
            .await
            .unwrap();
        assert_eq!(out, "hello");

        let err = EchoProvider.invoke("echo", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }

    #[test]
    fn outcome_constructors() {
        assert!(!ToolOutcome::success("ok").is_error);
        assert!(ToolOutcome::error("{}").is_error);
    }
}
