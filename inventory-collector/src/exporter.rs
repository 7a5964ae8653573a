//! Inventory exporter polling.
//!
//! Each target exposes a fixed set of plain HTTP feeds:
//!
//! ```text
//! GET http://<endpoint>/dpkg     package-manager inventory
//! GET http://<endpoint>/snap     snap inventory
//! GET http://<endpoint>/kernel   running kernel version
//! ```
//!
//! Bodies are archived verbatim, one entry per feed, into the archive of the
//! target's `(customer, site, model)` group.

use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use inventory_common::{RunContext, Settings, TargetConfig};

use crate::archive;
use crate::error::{CollectorError, Result};

/// Feeds fetched from every exporter, in order.
pub const FEEDS: [&str; 3] = ["dpkg", "snap", "kernel"];

/// Counters for one exporter collection pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExporterStats {
    /// Feeds archived.
    pub archived: usize,
    /// Feeds skipped after a fetch failure.
    pub skipped: usize,
}

/// Polls exporters and archives their feeds.
pub struct ExporterCollector {
    client: reqwest::Client,
    collection_path: PathBuf,
    context: RunContext,
    abort_on_error: bool,
}

impl ExporterCollector {
    /// Create a collector writing under `settings.collection_path`.
    pub fn new(settings: &Settings, context: RunContext) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = settings.http_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            inventory_common::Error::Config(format!("Failed to build HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            collection_path: settings.collection_path.clone(),
            context,
            abort_on_error: settings.abort_on_exporter_error,
        })
    }

    /// Collect every feed of every target, target by target.
    ///
    /// With `abort_on_exporter_error` set, the first failed fetch aborts the
    /// pass; otherwise the failed feed is logged and skipped.
    pub async fn collect(&self, targets: &[TargetConfig]) -> Result<ExporterStats> {
        let mut stats = ExporterStats::default();

        info!(
            targets = targets.len(),
            abort_on_error = self.abort_on_error,
            "Collecting exporter data"
        );

        for target in targets {
            self.collect_target(target, &mut stats).await?;
        }

        info!(
            archived = stats.archived,
            skipped = stats.skipped,
            "Exporter collection finished"
        );

        Ok(stats)
    }

    async fn collect_target(&self, target: &TargetConfig, stats: &mut ExporterStats) -> Result<()> {
        let archive_path = self.context.archive_path(
            &self.collection_path,
            &target.customer,
            &target.site,
            &target.model,
        );

        for feed in FEEDS {
            let body = match self.fetch(target, feed).await {
                Ok(body) => body,
                Err(e) if self.abort_on_error => {
                    error!(hostname = %target.hostname, feed, error = %e, "Exporter collection failed");
                    return Err(e);
                }
                Err(e) => {
                    warn!(hostname = %target.hostname, feed, error = %e, "Skipping feed");
                    stats.skipped += 1;
                    continue;
                }
            };

            let staging_path =
                self.context
                    .staging_path(&self.collection_path, feed, &target.hostname);
            archive::stage_and_append(&archive_path, &staging_path, &body)?;
            stats.archived += 1;

            debug!(
                hostname = %target.hostname,
                feed,
                bytes = body.len(),
                "Feed archived"
            );
        }

        Ok(())
    }

    async fn fetch(&self, target: &TargetConfig, feed: &str) -> Result<Vec<u8>> {
        let url = format!("http://{}/{}", target.endpoint, feed);
        let failure = |message: String| CollectorError::Exporter {
            hostname: target.hostname.clone(),
            endpoint: target.endpoint.clone(),
            feed: feed.to_string(),
            message,
        };

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| failure(e.to_string()))?;

        let body = response.bytes().await.map_err(|e| failure(e.to_string()))?;
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_order() {
        assert_eq!(FEEDS, ["dpkg", "snap", "kernel"]);
    }

    #[test]
    fn test_exporter_error_names_target() {
        let err = CollectorError::Exporter {
            hostname: "node1".to_string(),
            endpoint: "10.0.0.5:9100".to_string(),
            feed: "dpkg".to_string(),
            message: "connection refused".to_string(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("'node1'"));
        assert!(rendered.contains("10.0.0.5:9100/dpkg"));
    }
}
