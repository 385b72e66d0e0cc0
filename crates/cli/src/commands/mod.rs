pub mod generate;
pub mod init;
pub mod tools;

use pixelforge_config::{load_tool_providers, AppConfig, ToolProviderConfig};
use std::path::Path;

/// Tool providers for a command: the given file when present, otherwise
/// the ones declared in the config file.
pub fn resolve_tool_providers(
    config: &AppConfig,
    file: Option<&Path>,
) -> Result<Vec<ToolProviderConfig>, Box<dyn std::error::Error>> {
    let providers = match file {
        Some(path) => load_tool_providers(path)?,
        None => config.tool_providers()?,
    };
    Ok(providers)
}
