//! Run orchestration.
//!
//! One run connects to the controller first so connection problems surface
//! before anything is written, then collects exporters, then controller
//! models, and finally disconnects. The controller is disconnected exactly
//! once on every path after a successful connect.

use tracing::{info, warn};

use inventory_common::{Config, RunContext};

use crate::controller::{ControllerConnector, ControllerSession};
use crate::error::Result;
use crate::exporter::{ExporterCollector, ExporterStats};
use crate::workload::{GroupStats, WorkloadCollector};

/// What a run should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Collect everything.
    Collect,
    /// Only connect to and disconnect from the controller.
    DryRun,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Timestamp shared by every file of the run.
    pub timestamp: String,
    /// Mode the run executed in.
    pub mode: RunMode,
    /// Whether a controller connection was made.
    pub controller_connected: bool,
    /// Exporter phase counters.
    pub exporter: ExporterStats,
    /// Controller phase counters.
    pub groups: GroupStats,
}

impl RunReport {
    fn new(timestamp: &str, mode: RunMode) -> Self {
        Self {
            timestamp: timestamp.to_string(),
            mode,
            controller_connected: false,
            exporter: ExporterStats::default(),
            groups: GroupStats::default(),
        }
    }
}

/// A single collection run.
pub struct Pipeline<K: ControllerConnector> {
    config: Config,
    context: RunContext,
    connector: K,
}

impl<K: ControllerConnector> Pipeline<K> {
    /// Create a run over `config`, stamping files with `context`.
    pub fn new(config: Config, context: RunContext, connector: K) -> Self {
        Self {
            config,
            context,
            connector,
        }
    }

    /// Execute the run. The first fatal error aborts it; entries archived
    /// before the failure stay on disk.
    pub async fn run(&self, mode: RunMode) -> Result<RunReport> {
        let mut report = RunReport::new(self.context.timestamp(), mode);

        info!(
            timestamp = %self.context.timestamp(),
            mode = ?mode,
            targets = self.config.targets.len(),
            controller = self.config.juju_controller.is_some(),
            "Starting inventory collection"
        );

        if mode == RunMode::Collect {
            self.config.prepare_collection_path()?;
        }

        let mut session = match &self.config.juju_controller {
            Some(controller) => Some(ControllerSession::open(&self.connector, controller).await?),
            None => {
                warn!("No controller configured, skipping controller collection");
                None
            }
        };
        report.controller_connected = session.is_some();

        let outcome = match mode {
            RunMode::DryRun => Ok(()),
            RunMode::Collect => self.collect(session.as_mut(), &mut report).await,
        };

        if let Some(session) = session {
            session.close().await;
        }

        outcome?;

        info!(
            timestamp = %report.timestamp,
            feeds = report.exporter.archived,
            models = report.groups.groups,
            "Inventory collection complete"
        );

        Ok(report)
    }

    async fn collect(
        &self,
        session: Option<&mut ControllerSession<K::Connection>>,
        report: &mut RunReport,
    ) -> Result<()> {
        let exporter = ExporterCollector::new(&self.config.settings, self.context.clone())?;
        report.exporter = exporter.collect(&self.config.targets).await?;

        if let Some(session) = session {
            let workload = WorkloadCollector::new(
                &self.config.settings,
                self.config.models.clone(),
                self.context.clone(),
            );
            report.groups = workload.collect(session).await?;
        }

        Ok(())
    }
}
