//! Tool provider configuration.
//!
//! Providers can be listed in two shapes, in TOML or JSON:
//!
//! ```toml
//! [[servers]]
//! name = "figma"
//! transport = "stdio"
//! command = "npx"
//! args = ["-y", "figma-developer-mcp", "--stdio"]
//! ```
//!
//! or as a named map with the transport inferred from the keys present:
//!
//! ```json
//! { "mcpServers": { "storybook": { "url": "http://localhost:6006/mcp" } } }
//! ```
//!
//! Both normalize to `Vec<ToolProviderConfig>`.

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One configured tool provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolProviderConfig {
    /// Provider name, used in logs and tool ownership
    pub name: String,

    #[serde(flatten)]
    pub transport: TransportConfig,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    60
}

/// How to reach a provider. Resolved once when the bridge connects.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Local child process speaking newline-delimited JSON-RPC
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        env: BTreeMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<PathBuf>,
    },
    /// Remote endpoint speaking JSON-RPC over HTTP POST
    Http {
        url: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        headers: BTreeMap<String, String>,
    },
}

impl TransportConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            TransportConfig::Stdio { .. } => "stdio",
            TransportConfig::Http { .. } => "http",
        }
    }
}

// Env values and headers routinely carry tokens.
impl std::fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportConfig::Stdio {
                command,
                args,
                env,
                cwd,
            } => f
                .debug_struct("Stdio")
                .field("command", command)
                .field("args", args)
                .field("env", &env.keys().collect::<Vec<_>>())
                .field("cwd", cwd)
                .finish(),
            TransportConfig::Http { url, headers } => f
                .debug_struct("Http")
                .field("url", url)
                .field("headers", &headers.keys().collect::<Vec<_>>())
                .finish(),
        }
    }
}

/// An entry of the named-map shape. Exactly one of `command` / `url`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamedServerEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl NamedServerEntry {
    fn into_config(self, name: String) -> Result<ToolProviderConfig, ConfigError> {
        let transport = match (self.command, self.url) {
            (Some(command), None) => TransportConfig::Stdio {
                command,
                args: self.args,
                env: self.env,
                cwd: self.cwd,
            },
            (None, Some(url)) => TransportConfig::Http {
                url,
                headers: self.headers,
            },
            (Some(_), Some(_)) => {
                return Err(ConfigError::ValidationError(format!(
                    "server '{name}' sets both command and url"
                )));
            }
            (None, None) => {
                return Err(ConfigError::ValidationError(format!(
                    "server '{name}' needs either command or url"
                )));
            }
        };

        Ok(ToolProviderConfig {
            name,
            transport,
            timeout_secs: self.timeout_secs.unwrap_or_else(default_timeout_secs),
        })
    }
}

/// Both accepted shapes, as they appear on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolProviderSet {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<ToolProviderConfig>,

    #[serde(default, rename = "mcpServers", skip_serializing_if = "BTreeMap::is_empty")]
    pub mcp_servers: BTreeMap<String, NamedServerEntry>,
}

impl ToolProviderSet {
    /// Flatten into the canonical list: `servers` first, then the named
    /// map in key order.
    pub fn normalize(self) -> Result<Vec<ToolProviderConfig>, ConfigError> {
        let mut out = self.servers;
        for (name, entry) in self.mcp_servers {
            out.push(entry.into_config(name)?);
        }
        validate_providers(&out)?;
        Ok(out)
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty() && self.mcp_servers.is_empty()
    }
}

/// Load a provider file. A missing file is an empty provider list.
///
/// `.json` files are parsed as JSON, anything else as TOML.
pub fn load_tool_providers(path: &Path) -> Result<Vec<ToolProviderConfig>, ConfigError> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "No tool provider file, continuing without tools");
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let set: ToolProviderSet = if is_json {
        serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
    } else {
        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
    };

    set.normalize()
}

fn validate_providers(providers: &[ToolProviderConfig]) -> Result<(), ConfigError> {
    let mut seen = std::collections::HashSet::new();
    for provider in providers {
        if provider.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "tool provider name must not be empty".into(),
            ));
        }
        if !seen.insert(provider.name.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate tool provider name '{}'",
                provider.name
            )));
        }
        let target_empty = match &provider.transport {
            TransportConfig::Stdio { command, .. } => command.trim().is_empty(),
            TransportConfig::Http { url, .. } => url.trim().is_empty(),
        };
        if target_empty {
            return Err(ConfigError::ValidationError(format!(
                "tool provider '{}' has an empty {} target",
                provider.name,
                provider.transport.kind()
            )));
        }
    }
    Ok(())
}
