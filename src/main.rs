use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use parley::api::HttpBackend;
use parley::commands::{self, AskOptions};
use parley::config::Config;
use parley::events::ChatModel;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "parley")]
#[command(version)]
#[command(about = "Terminal chat client for a remote /api/chat service", long_about = None)]
struct Cli {
    /// Chat service base URL (overrides config and PARLEY_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a single message and print the reply
    Ask {
        message: String,
        #[arg(long, short)]
        model: Option<ChatModel>,
        #[arg(long, short)]
        temperature: Option<f32>,
        #[arg(long, short)]
        system: Option<String>,
    },
    /// List saved conversations on the server
    Conversations,
    /// Show the effective configuration
    Config {
        /// Write the default config file if none exists
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(url) = cli.base_url {
        config.base_url = url;
    }

    parley::logging::init(&config)?;

    let backend = HttpBackend::new(&config).context("Failed to create HTTP client")?;

    match cli.command {
        None => parley::app::run(config, Arc::new(backend)).await,
        Some(Commands::Ask {
            message,
            model,
            temperature,
            system,
        }) => {
            let options = AskOptions {
                model,
                temperature,
                system_prompt: system,
            };
            commands::ask(&config, &backend, &message, options).await
        }
        Some(Commands::Conversations) => commands::list_conversations(&backend).await,
        Some(Commands::Config { init }) => commands::show_config(&config, init),
    }
}
