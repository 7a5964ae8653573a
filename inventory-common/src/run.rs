//! Per-run context and file naming.
//!
//! Every archive and staging file produced by one run carries the same
//! second-resolution timestamp, minted once when the run starts.
//!
//! ```text
//! archive:  {customer}_@_{site}_@_{group}_@_{timestamp}.tar
//! staging:  {kind}_@_{identifier}_@_{timestamp}
//! ```

use std::path::{Path, PathBuf};

/// Separator between name components.
pub const NAME_SEPARATOR: &str = "_@_";

/// Timestamp layout, e.g. `20240131235959`.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// State shared by every collection phase of a single run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    timestamp: String,
}

impl RunContext {
    /// Mint a new context stamped with the current local time.
    pub fn new() -> Self {
        Self {
            timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    /// Build a context with a fixed timestamp.
    pub fn with_timestamp(timestamp: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
        }
    }

    /// The run timestamp.
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Archive file name for a `(customer, site, group)` tuple.
    pub fn archive_name(&self, customer: &str, site: &str, group: &str) -> String {
        format!(
            "{}.tar",
            [customer, site, group, &self.timestamp].join(NAME_SEPARATOR)
        )
    }

    /// Staging file name for one payload of `kind` about `identifier`.
    pub fn staging_name(&self, kind: &str, identifier: &str) -> String {
        [kind, identifier, &self.timestamp].join(NAME_SEPARATOR)
    }

    /// Full archive path under `dir`.
    pub fn archive_path(&self, dir: &Path, customer: &str, site: &str, group: &str) -> PathBuf {
        dir.join(self.archive_name(customer, site, group))
    }

    /// Full staging path under `dir`.
    pub fn staging_path(&self, dir: &Path, kind: &str, identifier: &str) -> PathBuf {
        dir.join(self.staging_name(kind, identifier))
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}
