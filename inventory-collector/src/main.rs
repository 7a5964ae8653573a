//! Inventory collector binary.
//!
//! Collects exporter and controller inventory into timestamped archives,
//! or with `--dry-run` only checks that the controller is reachable.

use anyhow::{Context, Result};
use clap::Parser;

use inventory_collector::{CollectorArgs, JujuConnector, Pipeline, RunMode};
use inventory_common::{Config, RunContext, init_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    let args = CollectorArgs::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    init_tracing(&args.logging(&config.logging)).context("Failed to initialize tracing")?;

    let mode = if args.dry_run {
        RunMode::DryRun
    } else {
        RunMode::Collect
    };

    let pipeline = Pipeline::new(config, RunContext::new(), JujuConnector::new());
    let report = pipeline.run(mode).await?;

    if report.mode == RunMode::DryRun {
        println!("OK.");
    }

    Ok(())
}
