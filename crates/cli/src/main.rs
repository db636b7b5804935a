//! ragstream CLI — the main entry point.
//!
//! Commands:
//! - `ask`     — Stream one turn to stdout and save it
//! - `plan`    — Show the retrieval budget a message would get
//! - `models`  — List configured and endpoint models
//! - `config`  — Show, locate or initialize the configuration file

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "ragstream",
    about = "ragstream — word-safe streaming chat with token-budgeted retrieval",
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
    /// Send one message and stream the reply
    Ask {
        /// The message to send
        message: String,

        /// Override the configured default model
        #[arg(short, long)]
        model: Option<String>,

        /// Continue an existing conversation
        #[arg(short, long)]
        conversation: Option<String>,

        /// Reference files to retrieve context from
        #[arg(long = "context", value_name = "FILE")]
        context: Vec<PathBuf>,
    },

    /// Show the retrieval budget plan for a message
    Plan {
        message: String,

        /// Include the history of an existing conversation
        #[arg(short, long)]
        conversation: Option<String>,
    },

    /// List available models
    Models,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the configuration file path
    Path,
    /// Write a default configuration file if none exists
    Init,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries only model text
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
        Commands::Ask {
            message,
            model,
            conversation,
            context,
        } => {
            commands::ask::run(commands::ask::AskArgs {
                message,
                model,
                conversation,
                context,
            })
            .await?
        }
        Commands::Plan {
            message,
            conversation,
        } => commands::plan::run(&message, conversation).await?,
        Commands::Models => commands::models::run().await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show()?,
            ConfigAction::Path => commands::config_cmd::path()?,
            ConfigAction::Init => commands::config_cmd::init()?,
        },
    }

    Ok(())
}
