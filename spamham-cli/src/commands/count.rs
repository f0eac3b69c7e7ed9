//! Count command: recorded pending count

use anyhow::{Context, Result};
use clap::Parser;

use spamham_core::{RequestContext, Services, SpamhamConfig, PENDING_COUNTER};

use super::{open_store, StoreArgs};

#[derive(Parser, Debug)]
pub struct CountArgs {
    /// Print {"pending": n} instead of the bare number
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub store: StoreArgs,
}

pub async fn run_count(args: CountArgs, config: SpamhamConfig) -> Result<()> {
    let store = open_store(&args.store, &config).await?;
    let services = Services::new(store, config.counter);

    let pending = services
        .counter()
        .read(&RequestContext::background(), PENDING_COUNTER)
        .await
        .context("Failed to read pending counter")?;

    if args.json {
        println!("{}", serde_json::json!({ "pending": pending }));
    } else {
        println!("{}", pending);
    }
    Ok(())
}
