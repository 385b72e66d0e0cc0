//! Configuration loading, validation, and management for PixelForge.
//!
//! Loads configuration from `~/.pixelforge/config.toml` with environment
//! variable overrides. Validates all settings at startup.

mod tool_providers;

pub use tool_providers::{
    load_tool_providers, NamedServerEntry, ToolProviderConfig, ToolProviderSet, TransportConfig,
};

use pixelforge_core::{CompletionPolicy, PrefetchSpec, RunLimits};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.pixelforge/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// LLM backend selection
    #[serde(default)]
    pub llm: LlmConfig,

    /// Turn and size limits
    #[serde(default)]
    pub limits: RunLimits,

    /// Completion detection
    #[serde(default)]
    pub completion: CompletionPolicy,

    /// Prefetch plan, one entry per category
    #[serde(default = "PrefetchSpec::defaults")]
    pub prefetch: Vec<PrefetchSpec>,

    /// Tool providers declared inline (either shape)
    #[serde(flatten)]
    pub tools: ToolProviderSet,
}

/// LLM backend configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Backend kind: openai, ollama, lmstudio, openrouter, anthropic, custom
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL override (required for `custom`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-request timeout for backend calls
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider() -> String {
    "ollama".into()
}
fn default_model() -> String {
    "qwen2.5-coder:14b".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    8192
}
fn default_timeout_secs() -> u64 {
    300
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            endpoint: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("endpoint", &self.endpoint)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

const EXAMPLE_SERVERS: &str = r#"
# Tool providers. Either a list:
#
# [[servers]]
# name = "figma"
# transport = "stdio"
# command = "npx"
# args = ["-y", "figma-developer-mcp", "--stdio"]
#
# or a named map, transport inferred from `command` / `url`:
#
# [mcpServers.storybook]
# url = "http://localhost:6006/mcp"
"#;

impl AppConfig {
    /// Load configuration from the default path (~/.pixelforge/config.toml).
    ///
    /// Environment overrides:
    /// - `PIXELFORGE_API_KEY`, then `ANTHROPIC_API_KEY` / `OPENAI_API_KEY`
    /// - `PIXELFORGE_PROVIDER`, `PIXELFORGE_MODEL`, `PIXELFORGE_ENDPOINT`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(provider) = lookup("PIXELFORGE_PROVIDER") {
            self.llm.provider = provider;
        }
        if let Some(model) = lookup("PIXELFORGE_MODEL") {
            self.llm.model = model;
        }
        if let Some(endpoint) = lookup("PIXELFORGE_ENDPOINT") {
            self.llm.endpoint = Some(endpoint);
        }

        if self.llm.api_key.is_none() {
            let vendor_key = if self.llm.provider == "anthropic" {
                "ANTHROPIC_API_KEY"
            } else {
                "OPENAI_API_KEY"
            };
            self.llm.api_key = lookup("PIXELFORGE_API_KEY").or_else(|| lookup(vendor_key));
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".pixelforge")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::ValidationError(
                "llm.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.llm.provider == "custom" && self.llm.endpoint.is_none() {
            return Err(ConfigError::ValidationError(
                "llm.endpoint is required when llm.provider = \"custom\"".into(),
            ));
        }

        if self.limits.max_turns == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_turns must be at least 1".into(),
            ));
        }

        if self.limits.duplicate_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "limits.duplicate_threshold must be at least 1".into(),
            ));
        }

        if self.limits.max_tool_result_chars < 256 {
            return Err(ConfigError::ValidationError(
                "limits.max_tool_result_chars must be at least 256".into(),
            ));
        }

        if self.limits.max_history_chars < self.limits.max_tool_result_chars {
            return Err(ConfigError::ValidationError(
                "limits.max_history_chars must not be smaller than max_tool_result_chars".into(),
            ));
        }

        let mut categories: Vec<_> = self.prefetch.iter().map(|p| p.category).collect();
        categories.sort();
        categories.dedup();
        if categories.len() != self.prefetch.len() {
            return Err(ConfigError::ValidationError(
                "each prefetch category may appear only once".into(),
            ));
        }

        if self.completion.phrases.iter().any(|p| p.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "completion phrases must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// The tool providers declared in this file, normalized.
    pub fn tool_providers(&self) -> Result<Vec<ToolProviderConfig>, ConfigError> {
        self.tools.clone().normalize()
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.llm.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        let mut out = toml::to_string_pretty(&config).unwrap_or_default();
        out.push_str(EXAMPLE_SERVERS);
        out
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            limits: RunLimits::default(),
            completion: CompletionPolicy::default(),
            prefetch: PrefetchSpec::defaults(),
            tools: ToolProviderSet::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixelforge_core::PrefetchCategory;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.limits.max_turns, 20);
        assert_eq!(config.prefetch.len(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.llm.model, config.llm.model);
        assert_eq!(parsed.limits, config.limits);
        assert_eq!(parsed.prefetch, config.prefetch);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.llm.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_turn_budget_rejected() {
        let mut config = AppConfig::default();
        config.limits.max_turns = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn custom_provider_requires_endpoint() {
        let mut config = AppConfig::default();
        config.llm.provider = "custom".into();
        assert!(config.validate().is_err());
        config.llm.endpoint = Some("http://localhost:8000/v1".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn duplicate_prefetch_category_rejected() {
        let toml_str = r#"
[[prefetch]]
category = "design"
tools = ["a"]

[[prefetch]]
category = "design"
tools = ["b"]
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.llm.provider, "ollama");
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[llm]
provider = "anthropic"
model = "claude-sonnet-4-20250514"

[limits]
max_turns = 8

[[prefetch]]
category = "design"
tools = ["get_figma_data"]
max_chars = 5000
argument = "url"

[[servers]]
name = "figma"
transport = "stdio"
command = "npx"
args = ["figma-developer-mcp", "--stdio"]
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.llm.temperature, 0.2);
        assert_eq!(config.limits.max_turns, 8);
        assert_eq!(config.limits.max_history_chars, 120_000);
        assert_eq!(config.prefetch.len(), 1);
        assert_eq!(config.prefetch[0].category, PrefetchCategory::Design);
        assert_eq!(config.prefetch[0].argument.as_deref(), Some("url"));

        let providers = config.tool_providers().unwrap();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].name, "figma");
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("PIXELFORGE_PROVIDER", "anthropic"),
            ("PIXELFORGE_MODEL", "claude-sonnet-4-20250514"),
            ("ANTHROPIC_API_KEY", "sk-ant-test"),
            ("OPENAI_API_KEY", "sk-openai"),
        ]);
        let mut config = AppConfig::default();
        config.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.llm.model, "claude-sonnet-4-20250514");
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-ant-test"));
    }

    #[test]
    fn pixelforge_key_wins_over_vendor_key() {
        let env: HashMap<&str, &str> =
            HashMap::from([("PIXELFORGE_API_KEY", "pf"), ("OPENAI_API_KEY", "oa")]);
        let mut config = AppConfig::default();
        config.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.llm.api_key.as_deref(), Some("pf"));
    }

    #[test]
    fn debug_redacts_api_key() {
        let mut config = AppConfig::default();
        config.llm.api_key = Some("sk-very-secret".into());
        let debug = format!("{config:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("sk-very-secret"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("qwen2.5-coder"));
        assert!(toml_str.contains("prefetch"));
        assert!(toml_str.contains("# [[servers]]"));
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert!(parsed.tool_providers().unwrap().is_empty());
    }
}
