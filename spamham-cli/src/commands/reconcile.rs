//! Reconcile command: one recount-and-repair pass

use anyhow::{Context, Result};
use clap::Parser;

use spamham_core::{RequestContext, Services, SpamhamConfig};

use super::{open_store, StoreArgs};

#[derive(Parser, Debug)]
pub struct ReconcileArgs {
    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub store: StoreArgs,
}

pub async fn run_reconcile(args: ReconcileArgs, config: SpamhamConfig) -> Result<()> {
    let store = open_store(&args.store, &config).await?;
    let services = Services::new(store, config.counter);
    let ctx = RequestContext::background().with_actor("cli");

    let report = services
        .reconciler
        .reconcile(&ctx)
        .await
        .context("Reconciliation failed")?;

    if args.json {
        println!("{}", serde_json::to_string(&report)?);
    } else if report.corrected {
        println!(
            "pending counter corrected: recorded {} -> observed {} (drift {})",
            report.recorded, report.observed, report.drift
        );
    } else {
        println!("pending counter consistent: {}", report.observed);
    }
    Ok(())
}
