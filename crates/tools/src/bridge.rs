//! Tool bridge: one name-indexed view over every connected tool provider.

use futures::future::join_all;
use pixelforge_config::ToolProviderConfig;
use pixelforge_core::error::ToolError;
use pixelforge_core::tool::{ToolDescriptor, ToolOutcome, ToolProvider};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::mcp::connect_provider;

/// Routes tool invocations to the provider that owns each tool.
///
/// Built once per run; the tool set is fixed after construction.
pub struct ToolBridge {
    providers: Vec<Arc<dyn ToolProvider>>,
    tools: Vec<ToolDescriptor>,
    /// Tool name -> index into `providers`
    index: HashMap<String, usize>,
}

impl ToolBridge {
    /// A bridge with no providers.
    pub fn empty() -> Self {
        Self {
            providers: Vec::new(),
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Connect every configured provider and discover its tools.
    ///
    /// Any failure aborts the whole bridge; providers connected so far are
    /// closed before returning the error.
    pub async fn connect(configs: &[ToolProviderConfig]) -> Result<Self, ToolError> {
        let mut providers = Vec::with_capacity(configs.len());
        for config in configs {
            info!(
                provider = %config.name,
                transport = config.transport.kind(),
                "Connecting tool provider"
            );
            match connect_provider(config).await {
                Ok(provider) => providers.push(provider),
                Err(e) => {
                    close_all(&providers).await;
                    return Err(e);
                }
            }
        }
        Self::from_providers(providers).await
    }

    /// Build a bridge over already-connected providers.
    pub async fn from_providers(providers: Vec<Arc<dyn ToolProvider>>) -> Result<Self, ToolError> {
        let mut tools = Vec::new();
        let mut index = HashMap::new();

        for (slot, provider) in providers.iter().enumerate() {
            let discovered = match provider.discover().await {
                Ok(d) => d,
                Err(e) => {
                    close_all(&providers).await;
                    return Err(ToolError::ConnectionFailed {
                        provider: provider.name().to_string(),
                        reason: format!("tool discovery failed: {e}"),
                    });
                }
            };

            for descriptor in discovered {
                if let Some(&owner) = index.get(&descriptor.name) {
                    let owner: &Arc<dyn ToolProvider> = &providers[owner];
                    warn!(
                        tool = %descriptor.name,
                        kept = owner.name(),
                        ignored = provider.name(),
                        "Duplicate tool name across providers; keeping the first"
                    );
                    continue;
                }
                index.insert(descriptor.name.clone(), slot);
                tools.push(descriptor);
            }
        }

        info!(
            providers = providers.len(),
            tools = tools.len(),
            "Tool bridge ready"
        );

        Ok(Self {
            providers,
            tools,
            index,
        })
    }

    /// All discovered tools, in discovery order.
    pub fn list_tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Whether any provider is connected.
    pub fn is_connected(&self) -> bool {
        !self.providers.is_empty()
    }

    /// Invoke a tool by name. Failures come back as error outcomes carrying
    /// a JSON payload, never as `Err`.
    pub async fn invoke(&self, name: &str, arguments: Value) -> ToolOutcome {
        let Some(&slot) = self.index.get(name) else {
            debug!(tool = name, "Unknown tool requested");
            let known: Vec<&str> = self.tools.iter().map(|t| t.name.as_str()).collect();
            return ToolOutcome::error(
                json!({
                    "error": "unknown_tool",
                    "tool": name,
                    "message": format!("No tool named '{name}' is available"),
                    "available_tools": known,
                })
                .to_string(),
            );
        };

        let provider = &self.providers[slot];
        match provider.invoke(name, arguments).await {
            Ok(text) => ToolOutcome::success(text),
            Err(e) => {
                warn!(tool = name, provider = provider.name(), error = %e, "Tool invocation failed");
                ToolOutcome::error(
                    json!({
                        "error": "tool_failed",
                        "tool": name,
                        "provider": provider.name(),
                        "message": e.to_string(),
                    })
                    .to_string(),
                )
            }
        }
    }

    /// Close every provider in parallel. Individual failures are logged.
    pub async fn disconnect(&self) {
        close_all(&self.providers).await;
    }
}

async fn close_all(providers: &[Arc<dyn ToolProvider>]) {
    let results = join_all(providers.iter().map(|p| async move { (p.name(), p.close().await) })).await;
    for (name, result) in results {
        if let Err(e) = result {
            warn!(provider = name, error = %e, "Failed to close tool provider");
        }
    }
}
