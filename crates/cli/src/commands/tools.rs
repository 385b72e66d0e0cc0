//! `pixelforge tools`: List the tools the configured providers expose.

use pixelforge_config::AppConfig;
use pixelforge_core::tool::ToolDescriptor;
use pixelforge_tools::ToolBridge;
use std::path::PathBuf;

pub async fn run(providers: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let tool_providers = super::resolve_tool_providers(&config, providers.as_deref())?;

    if tool_providers.is_empty() {
        println!("No tool providers configured.");
        println!();
        println!("  Declare them in {}", AppConfig::config_dir().join("config.toml").display());
        println!("  or pass a provider file with --providers.");
        return Ok(());
    }

    let bridge = ToolBridge::connect(&tool_providers).await?;
    print!("{}", render(bridge.list_tools()));
    bridge.disconnect().await;

    Ok(())
}

/// Tools grouped by provider, in discovery order.
fn render(tools: &[ToolDescriptor]) -> String {
    let mut out = format!("{} tool(s) discovered\n", tools.len());
    let mut current: Option<&str> = None;

    for tool in tools {
        if current != Some(tool.provider.as_str()) {
            out.push_str(&format!("\n  [{}]\n", tool.provider));
            current = Some(tool.provider.as_str());
        }
        let required = tool.required_params();
        if required.is_empty() {
            out.push_str(&format!("    {:<28} {}\n", tool.name, tool.description));
        } else {
            out.push_str(&format!(
                "    {:<28} {} (requires: {})\n",
                tool.name,
                tool.description,
                required.join(", ")
            ));
        }
    }
    out
}
