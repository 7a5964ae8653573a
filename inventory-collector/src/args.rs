//! CLI argument parsing.

use std::path::PathBuf;

use clap::Parser;

use inventory_common::LoggingConfig;

/// Default configuration location of the snap package.
pub const DEFAULT_CONFIG_PATH: &str = "/var/snap/inventory-collector/current/config.json5";

/// Collect inventory data.
#[derive(Parser, Debug, Clone)]
#[command(name = "inventory-collector")]
#[command(about = "Collect inventory data", long_about = None)]
pub struct CollectorArgs {
    /// Configuration file path.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Verify the controller connection without producing any output.
    #[arg(short, long)]
    pub dry_run: bool,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

impl CollectorArgs {
    /// Logging configuration with the CLI level override applied.
    pub fn logging(&self, configured: &LoggingConfig) -> LoggingConfig {
        match &self.log_level {
            Some(level) => LoggingConfig {
                level: level.clone(),
                ..configured.clone()
            },
            None => configured.clone(),
        }
    }
}
