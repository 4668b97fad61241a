//! feedloom CLI, the main entry point.
//!
//! Commands:
//! - `serve`      Start the HTTP API
//! - `ingest`     Store parsed feed entries from a JSON file
//! - `recommend`  Print ranked feed items
//! - `like`       Record a like or dislike for an item
//! - `chat`       Interactive or single-message chat with tool calls
//! - `digest`     Write an HTML digest of the top items
//! - `config`     Create, show or validate the configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "feedloom",
    about = "feedloom: preference-ranked RSS reading with a tool-calling chat assistant",
    version
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
    /// Start the HTTP API server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override the bind address
        #[arg(long)]
        host: Option<String>,
    },

    /// Store entries from a JSON array of `{title, link, summary, published}`
    Ingest {
        /// Feed URL the entries came from
        #[arg(short, long)]
        source: String,

        /// JSON file with the entries
        file: PathBuf,
    },

    /// Print recommended feed items, best first
    Recommend {
        #[arg(short, long)]
        limit: Option<usize>,

        /// Only items published on this day (YYYY-MM-DD)
        #[arg(short, long)]
        date: Option<String>,

        /// Only items from this feed URL
        #[arg(short, long)]
        source: Option<String>,

        /// Retrain the preference model first
        #[arg(long)]
        refresh: bool,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Like or dislike a feed item
    Like {
        feed_id: String,

        /// Record a dislike instead
        #[arg(long)]
        dislike: bool,

        /// Why you disliked it
        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Chat with the assistant
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Model type from `[models.*]`
        #[arg(long)]
        model_type: Option<String>,
    },

    /// Write an HTML digest of the top recommended items
    Digest {
        #[arg(long)]
        model_type: Option<String>,

        #[arg(short, long)]
        limit: Option<usize>,

        #[arg(short, long)]
        date: Option<String>,

        /// Write the HTML here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default config file if none exists
    Init,
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Check the configuration
    Validate,
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
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve { port, host } => commands::serve::run(port, host).await?,
        Commands::Ingest { source, file } => commands::feeds::ingest(&source, &file).await?,
        Commands::Recommend {
            limit,
            date,
            source,
            refresh,
            json,
        } => commands::feeds::recommend(limit, date, source, refresh, json).await?,
        Commands::Like {
            feed_id,
            dislike,
            reason,
        } => commands::feeds::like(&feed_id, !dislike, reason).await?,
        Commands::Chat { message, model_type } => commands::chat::run(message, model_type).await?,
        Commands::Digest {
            model_type,
            limit,
            date,
            output,
        } => commands::digest::run(model_type, limit, date, output).await?,
        Commands::Config { action } => match action {
            ConfigAction::Init => commands::config_cmd::init().await?,
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
        },
    }

    Ok(())
}
