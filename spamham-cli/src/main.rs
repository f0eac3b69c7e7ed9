//! spamham CLI - moderation queue service and maintenance tool
//!
//! - `serve`: run the HTTP service with periodic counter reconciliation
//! - `ingest`: add items to the pending queue
//! - `count`: show the recorded pending count
//! - `export`: dump the spam or ham collection as a JSON array
//! - `reconcile`: recount pending and repair the counter once
//! - `config`: manage ~/.spamham/config.toml

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use spamham_core::SpamhamConfig;

mod commands;
mod tracing_setup;

#[derive(Parser, Debug)]
#[command(
    name = "spamham",
    author,
    version,
    about = "Human-moderated spam/ham labeling queue",
    long_about = "Ingest items into a pending queue, let moderators categorize them as spam or ham, \
                  and export the labeled collections as JSON."
)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Export traces over OTLP (requires the telemetry feature)
    #[arg(long, global = true)]
    otel: bool,

    /// Config file (default: ~/.spamham/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP moderation service
    Serve(commands::serve::ServeArgs),
    /// Add items to the pending queue
    Ingest(commands::ingest::IngestArgs),
    /// Show the recorded pending count
    Count(commands::count::CountArgs),
    /// Export a labeled collection as a JSON array
    Export(commands::export::ExportArgs),
    /// Recount pending items and repair the counter
    Reconcile(commands::reconcile::ReconcileArgs),
    /// Manage spamham configuration (init, show, path)
    Config(commands::config::ConfigArgs),
}

fn load_config(path: Option<&PathBuf>) -> Result<SpamhamConfig> {
    match path {
        Some(path) => SpamhamConfig::load_from(path),
        None => SpamhamConfig::load(),
    }
}

async fn run(command: Commands, config_path: Option<PathBuf>) -> Result<()> {
    let config = || load_config(config_path.as_ref());

    match command {
        Commands::Serve(args) => commands::run_serve(args, config()?).await,
        Commands::Ingest(args) => commands::run_ingest(args, config()?).await,
        Commands::Count(args) => commands::run_count(args, config()?).await,
        Commands::Export(args) => commands::run_export(args, config()?).await,
        Commands::Reconcile(args) => commands::run_reconcile(args, config()?).await,
        Commands::Config(args) => commands::run_config(args, config_path.as_deref()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    tracing_setup::init(&tracing_setup::TracingConfig {
        debug: cli.debug,
        otel: cli.otel,
    })?;

    let result = run(cli.command, cli.config).await;

    tracing_setup::shutdown_otel();
    result
}
