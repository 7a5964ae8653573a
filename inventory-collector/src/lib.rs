//! Inventory collector.
//!
//! Polls inventory exporters and a Juju controller, and stores what it finds
//! in per-group tar archives under the configured collection path.
//!
//! # Data flow
//!
//! ```text
//! exporters  --HTTP GET-->  ExporterCollector  --+
//!                                                +--> staging file --> {customer}_@_{site}_@_{group}_@_{ts}.tar
//! controller --RPC------->  WorkloadCollector  --+
//! ```
//!
//! A run is driven by [`Pipeline`]; the controller RPC client is pluggable
//! through [`ControllerConnector`], with [`JujuConnector`] as the production
//! implementation.

pub mod archive;
pub mod args;
pub mod controller;
pub mod error;
pub mod exporter;
pub mod juju;
pub mod pipeline;
pub mod workload;

pub use args::CollectorArgs;
pub use controller::{
    ControllerConnection, ControllerConnector, ControllerSession, GroupSession, ModelConnection,
    ModelRef, dry_run,
};
pub use error::{CollectorError, ControllerError, Result};
pub use exporter::{ExporterCollector, ExporterStats, FEEDS};
pub use juju::JujuConnector;
pub use pipeline::{Pipeline, RunMode, RunReport};
pub use workload::{GroupStats, WorkloadCollector};
