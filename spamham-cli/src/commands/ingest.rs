//! Ingest command: push payloads into the pending queue

use std::io::Read;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use spamham_core::{Error, RequestContext, Services, SpamhamConfig};

use super::{open_store, StoreArgs};

#[derive(Parser, Debug)]
pub struct IngestArgs {
    /// Files to ingest, one item each (default: read stdin)
    #[arg(value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Treat every non-empty input line as a separate item (NDJSON)
    #[arg(long)]
    pub lines: bool,

    #[command(flatten)]
    pub store: StoreArgs,
}

fn read_inputs(args: &IngestArgs) -> Result<Vec<Vec<u8>>> {
    let mut inputs = Vec::new();
    if args.files.is_empty() {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("Failed to read stdin")?;
        inputs.push(buf);
    } else {
        for path in &args.files {
            let buf = std::fs::read(path).context(format!("Failed to read {}", path.display()))?;
            inputs.push(buf);
        }
    }

    if !args.lines {
        return Ok(inputs);
    }

    Ok(inputs
        .iter()
        .flat_map(|buf| buf.split(|b| *b == b'\n'))
        .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
        .map(<[u8]>::to_vec)
        .collect())
}

pub async fn run_ingest(args: IngestArgs, config: SpamhamConfig) -> Result<()> {
    let payloads = read_inputs(&args)?;
    let store = open_store(&args.store, &config).await?;
    let services = Services::new(store, config.counter);
    let ctx = RequestContext::background().with_actor("cli");

    let mut rejected = 0usize;
    for payload in payloads {
        match services.queue.ingest(&ctx, payload).await {
            Ok(receipt) => {
                if let Some(e) = &receipt.counter_error {
                    eprintln!("warning: {} stored but not counted: {}", receipt.key, e);
                }
                println!("{}", receipt.key.encode());
            }
            Err(e @ Error::InvalidPayload { .. }) => {
                eprintln!("skipped: {}", e);
                rejected += 1;
            }
            Err(e) => return Err(e).context("Ingest failed"),
        }
    }

    if rejected > 0 {
        bail!("{} payload(s) rejected", rejected);
    }
    Ok(())
}
