//! HTTP server command
//!
//! Runs the moderation service with reconciliation in the background.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;

use spamham_core::{Services, SpamhamConfig};
use spamham_server::{run_server, AppState, ServerConfig};

use super::{open_store, StoreArgs};

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to bind to (overrides config and SPAMHAM_BIND)
    #[arg(long, short = 'b')]
    pub bind: Option<SocketAddr>,

    /// Allow permissive CORS (all origins) - use with caution
    #[arg(long)]
    pub cors_permissive: bool,

    /// Seconds between counter reconciliation passes (0 disables)
    #[arg(long, value_name = "SECS")]
    pub reconcile_interval: Option<u64>,

    #[command(flatten)]
    pub store: StoreArgs,
}

/// Run the HTTP server
pub async fn run_serve(args: ServeArgs, mut config: SpamhamConfig) -> Result<()> {
    if let Some(secs) = args.reconcile_interval {
        config.reconcile.interval_secs = secs;
    }

    let mut server_config = ServerConfig::from_config(&config).context("Invalid [server] config")?;
    if let Some(bind) = args.bind {
        server_config.bind_addr = bind;
    }
    server_config.cors_permissive |= args.cors_permissive;

    let store = open_store(&args.store, &config).await?;
    let services = Services::new(store, config.counter);
    let state = AppState::new(
        services,
        config.auth.clone(),
        config.server.request_timeout(),
    );

    tracing::info!(
        bind = %server_config.bind_addr,
        login_url = %config.auth.login_url,
        "Starting spamham server"
    );

    // Run server (blocks until shutdown)
    run_server(state, server_config)
        .await
        .context("Server error")?;

    Ok(())
}
