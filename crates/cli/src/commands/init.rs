//! `pixelforge init`: Write the default configuration file.

use pixelforge_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("Created config directory: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("Config already exists at: {}", config_path.display());
        println!("  Edit it manually or delete it and re-run init.");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("Created config.toml at: {}", config_path.display());
    println!();
    println!("Next steps:");
    println!("  1. Pick a backend under [llm] (ollama needs no key)");
    println!("  2. Declare your design tool providers under [[servers]] or [mcpServers.*]");
    println!("  3. pixelforge generate <design-url> --output ./generated");

    Ok(())
}
