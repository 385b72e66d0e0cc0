//! MCP-style tool providers over stdio and HTTP.
//!
//! The transport is chosen once, in [`connect_provider`], from the
//! configured transport tag. Everything above this module only sees
//! `dyn ToolProvider`.

pub mod http;
pub mod jsonrpc;
pub mod stdio;

use async_trait::async_trait;
use pixelforge_config::{ToolProviderConfig, TransportConfig};
use pixelforge_core::error::ToolError;
use pixelforge_core::tool::{ToolDescriptor, ToolProvider};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub use http::HttpTransport;
pub use stdio::StdioTransport;

/// Upper bound on `tools/list` pages, in case a server keeps handing out cursors.
const MAX_LIST_PAGES: usize = 32;

/// A request/response channel to one MCP server.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Send a request and wait for the matching response's `result`.
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, ToolError>;

    /// Send a notification (no response expected).
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), ToolError>;

    /// Release the underlying process or session.
    async fn shutdown(&self) -> Result<(), ToolError>;
}

/// A tool provider speaking MCP over some [`RpcTransport`].
pub struct McpToolProvider {
    name: String,
    transport: Box<dyn RpcTransport>,
}

impl McpToolProvider {
    pub fn new(name: impl Into<String>, transport: Box<dyn RpcTransport>) -> Self {
        Self {
            name: name.into(),
            transport,
        }
    }

    /// Perform the `initialize` handshake.
    pub async fn initialize(&self) -> Result<(), ToolError> {
        let result = self
            .transport
            .request("initialize", Some(jsonrpc::initialize_params()))
            .await
            .map_err(|e| self.connection_failed(e))?;

        let server = result["serverInfo"]["name"].as_str().unwrap_or("unknown");
        let version = result["protocolVersion"].as_str().unwrap_or("unknown");
        info!(provider = %self.name, server, protocol = version, "Tool provider initialized");

        self.transport
            .notify("notifications/initialized", None)
            .await
            .map_err(|e| self.connection_failed(e))
    }

    fn connection_failed(&self, e: ToolError) -> ToolError {
        match e {
            ToolError::ConnectionFailed { .. } => e,
            other => ToolError::ConnectionFailed {
                provider: self.name.clone(),
                reason: other.to_string(),
            },
        }
    }
}

#[async_trait]
impl ToolProvider for McpToolProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn discover(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let params = match &cursor {
                Some(c) => json!({ "cursor": c }),
                None => json!({}),
            };
            let result = self.transport.request("tools/list", Some(params)).await?;
            let (page, next) = jsonrpc::parse_tools_page(&result, &self.name);
            tools.extend(page);

            match next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        debug!(provider = %self.name, count = tools.len(), "Discovered tools");
        Ok(tools)
    }

    async fn invoke(&self, tool: &str, arguments: Value) -> Result<String, ToolError> {
        let result = self
            .transport
            .request(
                "tools/call",
                Some(json!({ "name": tool, "arguments": arguments })),
            )
            .await?;

        jsonrpc::extract_call_result(&result).map_err(|reason| ToolError::ExecutionFailed {
            tool_name: tool.to_string(),
            reason,
        })
    }

    async fn close(&self) -> Result<(), ToolError> {
        self.transport.shutdown().await
    }
}

/// Establish a provider from its configuration and run the handshake.
pub async fn connect_provider(
    config: &ToolProviderConfig,
) -> Result<Arc<dyn ToolProvider>, ToolError> {
    let timeout = Duration::from_secs(config.timeout_secs);

    let transport: Box<dyn RpcTransport> = match &config.transport {
        TransportConfig::Stdio {
            command,
            args,
            env,
            cwd,
        } => Box::new(StdioTransport::spawn(
            &config.name,
            command,
            args,
            env,
            cwd.as_deref(),
            timeout,
        )?),
        TransportConfig::Http { url, headers } => {
            Box::new(HttpTransport::new(&config.name, url, headers, timeout)?)
        }
    };

    let provider = McpToolProvider::new(&config.name, transport);
    if let Err(e) = provider.initialize().await {
        let _ = provider.close().await;
        return Err(e);
    }
    Ok(Arc::new(provider))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Replays canned results keyed by method.
    struct CannedTransport {
        pages: Mutex<Vec<Value>>,
        calls: Mutex<Vec<(String, Option<Value>)>>,
    }

    #[async_trait]
    impl RpcTransport for CannedTransport {
        async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, ToolError> {
            self.calls.lock().unwrap().push((method.to_string(), params));
            match method {
                "initialize" => Ok(json!({"protocolVersion": "2025-03-26", "serverInfo": {"name": "canned"}})),
                "tools/list" => Ok(self.pages.lock().unwrap().remove(0)),
                "tools/call" => Ok(json!({"content": [{"type": "text", "text": "called"}]})),
                other => Err(ToolError::Protocol {
                    provider: "canned".into(),
                    reason: format!("unexpected {other}"),
                }),
            }
        }

        async fn notify(&self, method: &str, _params: Option<Value>) -> Result<(), ToolError> {
            self.calls.lock().unwrap().push((method.to_string(), None));
            Ok(())
        }

        async fn shutdown(&self) -> Result<(), ToolError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn discover_follows_cursor() {
        let transport = CannedTransport {
            pages: Mutex::new(vec![
                json!({"tools": [{"name": "a", "inputSchema": {"type": "object"}}], "nextCursor": "2"}),
                json!({"tools": [{"name": "b", "inputSchema": {"type": "object"}}]}),
            ]),
            calls: Mutex::new(Vec::new()),
        };
        let provider = McpToolProvider::new("canned", Box::new(transport));
        provider.initialize().await.unwrap();

        let tools = provider.discover().await.unwrap();
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);

        let out = provider.invoke("a", json!({"x": 1})).await.unwrap();
        assert_eq!(out, "called");
    }

    #[tokio::test]
    async fn unreachable_http_provider_fails_to_connect() {
        let config = ToolProviderConfig {
            name: "nowhere".into(),
            transport: TransportConfig::Http {
                url: "http://127.0.0.1:9/mcp".into(),
                headers: Default::default(),
            },
            timeout_secs: 2,
        };
        let err = connect_provider(&config).await.err().unwrap();
        assert!(matches!(err, ToolError::ConnectionFailed { .. }));
    }

    #[tokio::test]
    async fn missing_stdio_command_fails_to_connect() {
        let config = ToolProviderConfig {
            name: "ghost".into(),
            transport: TransportConfig::Stdio {
                command: "pixelforge-no-such-binary-xyz".into(),
                args: vec![],
                env: Default::default(),
                cwd: None,
            },
            timeout_secs: 2,
        };
        let err = connect_provider(&config).await.err().unwrap();
        assert!(matches!(err, ToolError::ConnectionFailed { .. }));
    }
}
