//! Command implementations for the spamham CLI

pub mod config;
pub mod count;
pub mod export;
pub mod ingest;
pub mod reconcile;
pub mod serve;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use spamham_core::store::migrations;
use spamham_core::{MemoryStore, PgStore, SpamhamConfig, Store};

// Re-export dispatcher functions for flat access from main.rs
pub use config::run_config;
pub use count::run_count;
pub use export::run_export;
pub use ingest::run_ingest;
pub use reconcile::run_reconcile;
pub use serve::run_serve;

/// Store selection shared by every command that touches data
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Database URL (overrides config)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Use a throwaway in-process store instead of Postgres (wins over --database-url)
    #[arg(long)]
    pub memory: bool,
}

/// Open the configured store, running migrations for Postgres
pub async fn open_store(args: &StoreArgs, config: &SpamhamConfig) -> Result<Arc<dyn Store>> {
    if args.memory {
        tracing::warn!("Using in-memory store; nothing will be persisted");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let database_url = args
        .database_url
        .clone()
        .or_else(|| config.store.database_url.clone())
        .context("DATABASE_URL not set. Set via --database-url, DATABASE_URL env, or [store] in ~/.spamham/config.toml (or pass --memory)")?;

    let store = PgStore::connect_with_options(&database_url, config.store.max_connections)
        .await
        .context("Failed to connect to database")?
        .with_page_size(config.store.page_size);

    migrations::run(store.pool())
        .await
        .context("Failed to run migrations")?;

    Ok(Arc::new(store))
}
