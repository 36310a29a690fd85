//! ngprep CLI - NextGen input package preparation

mod args;
mod workflow;

use anyhow::Result;
use clap::Parser;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

use args::Args;

fn setup_logging(debug: bool) {
    let level = if debug { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {}", e);
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.debug);

    workflow::run(args).inspect_err(|e| error!("An error occurred: {:#}", e))
}
