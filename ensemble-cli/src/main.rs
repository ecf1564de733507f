//! Ensemble Gateway CLI
//!
//! # Commands
//!
//! - `ensemble-cli run "<prompt>"` - run one prompt through the ensemble
//! - `ensemble-cli config` - print or validate the active gateway config
//! - `ensemble-cli bench <file>` - replay a file of prompts and report latency

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Multi-provider AI ensemble gateway CLI.
#[derive(Parser)]
#[command(name = "ensemble-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Fan a prompt out to multiple models, vote, and synthesize one answer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single prompt through the ensemble pipeline.
    Run {
        /// The prompt text.
        text: String,

        /// Tier to run under ("free" or "premium").
        #[arg(short, long, default_value = "free")]
        tier: String,

        /// Path to a TOML config file; falls back to built-in defaults.
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Print the active gateway configuration.
    Config {
        /// Path to a TOML config file; falls back to built-in defaults.
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Replay prompts from a newline-delimited file and report latency.
    Bench {
        /// Path to a file with one prompt per line.
        file: String,

        /// Tier to run under ("free" or "premium").
        #[arg(short, long, default_value = "free")]
        tier: String,

        /// Path to a TOML config file; falls back to built-in defaults.
        #[arg(short, long)]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { text, tier, config } => commands::run::run(text, tier, config).await,
        Commands::Config { config } => commands::config::run(config),
        Commands::Bench { file, tier, config } => commands::bench::run(file, tier, config).await,
    }
}
