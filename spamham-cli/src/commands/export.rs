//! Export command: a labeled collection as one JSON array

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use spamham_core::{Collection, RequestContext, Services, SpamhamConfig};

use super::{open_store, StoreArgs};

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum ExportTarget {
    Spam,
    Ham,
}

impl From<ExportTarget> for Collection {
    fn from(target: ExportTarget) -> Self {
        match target {
            ExportTarget::Spam => Collection::Spam,
            ExportTarget::Ham => Collection::Ham,
        }
    }
}

#[derive(Parser, Debug)]
pub struct ExportArgs {
    /// Collection to export
    #[arg(value_enum)]
    pub collection: ExportTarget,

    /// Output file (default: stdout)
    #[arg(long = "out", value_name = "PATH")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub store: StoreArgs,
}

pub async fn run_export(args: ExportArgs, config: SpamhamConfig) -> Result<()> {
    let store = open_store(&args.store, &config).await?;
    let services = Services::new(store, config.counter);
    let collection = Collection::from(args.collection);

    let body = services
        .listing
        .export_json(&RequestContext::background(), collection)
        .await
        .context(format!("Failed to export {}", collection))?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, &body).context(format!("Failed to write {}", path.display()))?;
            tracing::info!(collection = %collection, path = %path.display(), bytes = body.len(), "Export written");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&body)?;
            stdout.write_all(b"\n")?;
        }
    }
    Ok(())
}
