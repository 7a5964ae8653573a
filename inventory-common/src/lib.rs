//! Inventory Collector Common Library
//!
//! Shared types and utilities for the inventory collector:
//!
//! - [`config`] - Configuration model and loading (JSON5 format)
//! - [`run`] - Run context (timestamp) and archive/staging naming
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod run;

// Re-export commonly used types at the crate root
pub use config::{Config, ControllerConfig, LogFormat, LoggingConfig, Settings, TargetConfig};
pub use error::{Error, Result};
pub use run::{NAME_SEPARATOR, RunContext};

/// Initialize tracing with the given configuration.
///
/// `RUST_LOG` takes precedence over the configured level. Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(std::io::stderr))
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
