//! PixelForge CLI, the main entry point.
//!
//! Commands:
//! - `generate` : Run the agent against one design reference
//! - `tools`    : List the tools the configured providers expose
//! - `init`     : Write the default config file

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "pixelforge",
    about = "PixelForge: design references in, components out",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging and progress events
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate components, tests, and stories for a design reference
    Generate {
        /// Design reference, e.g. a design file URL with a node id
        task_ref: String,

        /// Directory generated files are written under
        #[arg(short, long)]
        output: PathBuf,

        /// Override the turn budget
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        max_turns: Option<u32>,

        /// Override the model
        #[arg(short, long)]
        model: Option<String>,

        /// Override the backend base URL
        #[arg(long)]
        endpoint: Option<String>,

        /// Tool provider file (TOML, or JSON by extension)
        #[arg(short, long)]
        providers: Option<PathBuf>,

        /// Skip the pre-fetch phase and let the model call tools itself
        #[arg(long)]
        no_prefetch: bool,
    },

    /// Connect to the tool providers and list their tools
    Tools {
        /// Tool provider file (TOML, or JSON by extension)
        #[arg(short, long)]
        providers: Option<PathBuf>,
    },

    /// Write the default configuration file
    Init,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the run summary
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Generate {
            task_ref,
            output,
            max_turns,
            model,
            endpoint,
            providers,
            no_prefetch,
        } => {
            let args = commands::generate::GenerateArgs {
                task_ref,
                output,
                max_turns,
                model,
                endpoint,
                providers,
                no_prefetch,
                verbose: cli.verbose,
            };
            commands::generate::run(args).await?
        }
        Commands::Tools { providers } => commands::tools::run(providers).await?,
        Commands::Init => commands::init::run().await?,
    }

    Ok(())
}
