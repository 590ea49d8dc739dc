//! Chorus CLI: the main entry point.
//!
//! Commands:
//! - `onboard`: Write the default config and memory directory
//! - `chat`: Interactive multi-agent chat
//! - `status`: Show configuration, roster and backend health

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "chorus",
    about = "Chorus — multi-agent group chat orchestrator",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration
    Onboard,

    /// Chat with the agents
    Chat {
        /// Channel to open first (defaults to the first group channel)
        #[arg(short, long)]
        channel: Option<String>,
    },

    /// Show system status
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Chat { channel } => commands::chat::run(channel).await?,
        Commands::Status => commands::status::run().await?,
    }

    Ok(())
}
