//! Provider router: selects the LLM backend from configuration.
//!
//! Local backends (Ollama, LM Studio) need no key; hosted ones do.

use crate::anthropic::AnthropicProvider;
use crate::openai_compat::OpenAiCompatProvider;
use pixelforge_config::LlmConfig;
use pixelforge_core::error::ProviderError;
use pixelforge_core::job::BackendSelection;
use pixelforge_core::provider::Provider;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// A ready-to-use backend plus the model it should be asked for.
#[derive(Clone)]
pub struct ResolvedBackend {
    pub provider: Arc<dyn Provider>,
    pub model: String,
}

impl std::fmt::Debug for ResolvedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedBackend")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .finish()
    }
}

/// Build the backend named by `config`, with per-run overrides applied.
pub fn build_from_config(
    config: &LlmConfig,
    selection: Option<&BackendSelection>,
) -> Result<ResolvedBackend, ProviderError> {
    let model = selection
        .and_then(|s| s.model.clone())
        .unwrap_or_else(|| config.model.clone());
    let endpoint = selection
        .and_then(|s| s.endpoint.as_deref())
        .or(config.endpoint.as_deref());
    let timeout = Duration::from_secs(config.timeout_secs);
    let name = config.provider.as_str();

    let require_key = || {
        config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ProviderError::NotConfigured(format!("{name} requires an API key")))
    };

    let provider: Arc<dyn Provider> = match name {
        "ollama" => Arc::new(OpenAiCompatProvider::ollama(endpoint, timeout)?),
        "lmstudio" => Arc::new(OpenAiCompatProvider::new(
            "lmstudio",
            endpoint.unwrap_or_else(|| default_base_url(name)),
            config.api_key.as_deref().unwrap_or("lm-studio"),
            timeout,
        )?),
        "openai" => match endpoint {
            Some(url) => Arc::new(OpenAiCompatProvider::new("openai", url, require_key()?, timeout)?),
            None => Arc::new(OpenAiCompatProvider::openai(require_key()?, timeout)?),
        },
        "openrouter" => Arc::new(OpenAiCompatProvider::new(
            "openrouter",
            endpoint.unwrap_or_else(|| default_base_url(name)),
            require_key()?,
            timeout,
        )?),
        "anthropic" => {
            let mut p = AnthropicProvider::new(require_key()?, timeout)?;
            if let Some(url) = endpoint {
                p = p.with_base_url(url);
            }
            Arc::new(p)
        }
        "custom" => {
            let url = endpoint.ok_or_else(|| {
                ProviderError::NotConfigured("custom provider requires an endpoint".into())
            })?;
            Arc::new(OpenAiCompatProvider::new(
                "custom",
                url,
                config.api_key.as_deref().unwrap_or_default(),
                timeout,
            )?)
        }
        other => {
            return Err(ProviderError::NotConfigured(format!(
                "unknown provider '{other}'"
            )));
        }
    };

    info!(provider = provider.name(), model = %model, "LLM backend selected");
    Ok(ResolvedBackend { provider, model })
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> &'static str {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1",
        "openai" => "https://api.openai.com/v1",
        "lmstudio" => "http://localhost:1234/v1",
        _ => "http://localhost:11434/v1",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn llm(provider: &str) -> LlmConfig {
        LlmConfig {
            provider: provider.into(),
            ..LlmConfig::default()
        }
    }

    #[test]
    fn default_config_builds_local_backend() {
        let resolved = build_from_config(&LlmConfig::default(), None).unwrap();
        assert_eq!(resolved.provider.name(), "ollama");
        assert_eq!(resolved.model, "qwen2.5-coder:14b");
    }

    #[test]
    fn selection_overrides_model() {
        let selection = BackendSelection {
            model: Some("llama3.1:8b".into()),
            endpoint: Some("http://gpu-box:11434/v1".into()),
        };
        let resolved = build_from_config(&llm("ollama"), Some(&selection)).unwrap();
        assert_eq!(resolved.model, "llama3.1:8b");
    }

    #[test]
    fn hosted_backends_need_a_key() {
        for name in ["openai", "openrouter", "anthropic"] {
            let err = build_from_config(&llm(name), None).unwrap_err();
            assert!(matches!(err, ProviderError::NotConfigured(_)), "{name}");
        }

        let mut config = llm("anthropic");
        config.api_key = Some("sk-ant-test".into());
        assert_eq!(build_from_config(&config, None).unwrap().provider.name(), "anthropic");
    }

    #[test]
    fn custom_requires_endpoint() {
        assert!(build_from_config(&llm("custom"), None).is_err());

        let mut config = llm("custom");
        config.endpoint = Some("http://localhost:8000/v1".into());
        assert_eq!(build_from_config(&config, None).unwrap().provider.name(), "custom");
    }

    #[test]
    fn lmstudio_and_unknown() {
        assert_eq!(
            build_from_config(&llm("lmstudio"), None).unwrap().provider.name(),
            "lmstudio"
        );
        assert!(build_from_config(&llm("bedrock"), None).is_err());
    }

    #[test]
    fn default_base_urls() {
        assert!(default_base_url("openrouter").contains("openrouter.ai"));
        assert!(default_base_url("openai").contains("api.openai.com"));
        assert!(default_base_url("ollama").contains("localhost:11434"));
    }
}
