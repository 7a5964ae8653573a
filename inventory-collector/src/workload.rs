//! Controller model collection.
//!
//! For every model the status snapshot and the exported bundle are stored in
//! the model's archive:
//!
//! ```text
//! {customer}_@_{site}_@_{model}_@_{ts}.tar
//!   juju_status_@_{model}_@_{ts}     FullStatus as JSON
//!   juju_bundle_@_{model}_@_{ts}     bundle document as JSON (one entry per document)
//! ```
//!
//! Bundle documents describing cross-model offers are not archived.

use std::path::PathBuf;

use serde::Deserialize;
use tracing::{debug, info, warn};

use inventory_common::{RunContext, Settings};

use crate::archive;
use crate::controller::{ControllerConnection, ControllerSession, ModelRef};
use crate::error::{CollectorError, Result};

/// Controller message for bundle export of a model without applications.
pub const NO_APPLICATIONS: &str = "nothing to export as there are no applications";

/// Bundle substituted when the model has no applications.
pub const EMPTY_BUNDLE: &str = "{}";

/// Marker of documents holding cross-model offers.
pub const OFFERS_MARKER: &str = "offers";

const STATUS_KIND: &str = "juju_status";
const BUNDLE_KIND: &str = "juju_bundle";

/// Counters for one model collection pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GroupStats {
    /// Models collected.
    pub groups: usize,
    /// Bundle documents archived.
    pub bundles_written: usize,
    /// Bundle documents dropped as offers.
    pub bundles_skipped: usize,
}

/// Collects status and bundles of controller models.
pub struct WorkloadCollector {
    collection_path: PathBuf,
    customer: String,
    site: String,
    models: Vec<String>,
    context: RunContext,
}

impl WorkloadCollector {
    /// Create a collector. A non-empty `models` list restricts collection to those names.
    pub fn new(settings: &Settings, models: Vec<String>, context: RunContext) -> Self {
        Self {
            collection_path: settings.collection_path.clone(),
            customer: settings.customer.clone(),
            site: settings.site.clone(),
            models,
            context,
        }
    }

    /// Collect every (selected) model known to the controller, one at a time.
    pub async fn collect<C: ControllerConnection>(
        &self,
        session: &mut ControllerSession<C>,
    ) -> Result<GroupStats> {
        let mut stats = GroupStats::default();
        let groups = self.select(session.groups().await?);

        info!(
            controller = %session.endpoint(),
            models = groups.len(),
            "Collecting controller models"
        );

        for model in &groups {
            self.collect_group(session, model, &mut stats).await?;
        }

        info!(
            models = stats.groups,
            bundles = stats.bundles_written,
            skipped = stats.bundles_skipped,
            "Controller collection finished"
        );

        Ok(stats)
    }

    fn select(&self, groups: Vec<ModelRef>) -> Vec<ModelRef> {
        if self.models.is_empty() {
            return groups;
        }

        for wanted in &self.models {
            if !groups.iter().any(|g| &g.name == wanted) {
                warn!(model = %wanted, "Configured model not found on controller");
            }
        }

        groups
            .into_iter()
            .filter(|g| self.models.contains(&g.name))
            .collect()
    }

    /// Collect one model into its archive.
    pub async fn collect_group<C: ControllerConnection>(
        &self,
        session: &mut ControllerSession<C>,
        model: &ModelRef,
        stats: &mut GroupStats,
    ) -> Result<()> {
        let name = model.name.as_str();
        let mut group = session.open_group(model).await?;

        let status = match group.status().await {
            Ok(status) => status,
            Err(e) => {
                group.close().await;
                return Err(CollectorError::controller(name, e));
            }
        };

        let bundle = match group.export_bundle().await {
            Ok(bundle) => Ok(bundle),
            Err(e) if e.api_message() == Some(NO_APPLICATIONS) => {
                warn!(model = group.name(), "Model has no applications, using empty bundle");
                Ok(EMPTY_BUNDLE.to_string())
            }
            Err(e) => Err(CollectorError::controller(name, e)),
        };

        group.close().await;
        let bundle = bundle?;

        let archive_path =
            self.context
                .archive_path(&self.collection_path, &self.customer, &self.site, name);

        let status_path = self
            .context
            .staging_path(&self.collection_path, STATUS_KIND, name);
        archive::stage_and_append(&archive_path, &status_path, &serde_json::to_vec(&status)?)?;

        let documents = bundle_documents(&bundle).map_err(|e| CollectorError::Bundle {
            group: name.to_string(),
            message: e.to_string(),
        })?;

        let bundle_path = self
            .context
            .staging_path(&self.collection_path, BUNDLE_KIND, name);
        for document in documents {
            if is_offers_document(&document) {
                debug!(model = name, "Skipping offers document");
                stats.bundles_skipped += 1;
                continue;
            }
            archive::stage_and_append(&archive_path, &bundle_path, document.as_bytes())?;
            stats.bundles_written += 1;
        }

        stats.groups += 1;
        info!(model = name, archive = %archive_path.display(), "Model archived");

        Ok(())
    }
}

/// Split a YAML stream into documents, each re-encoded as compact JSON.
///
/// A blank stream holds no documents.
pub fn bundle_documents(bundle: &str) -> std::result::Result<Vec<String>, serde_yaml::Error> {
    let mut documents = Vec::new();
    if bundle.trim().is_empty() {
        return Ok(documents);
    }

    for document in serde_yaml::Deserializer::from_str(bundle) {
        let value = serde_yaml::Value::deserialize(document)?;
        documents.push(yaml_to_json(value).to_string());
    }

    Ok(documents)
}

/// Whether an encoded bundle document holds cross-model offers.
///
/// Plain substring test on the encoded text: any mention of the marker,
/// key or value, excludes the document.
pub fn is_offers_document(encoded: &str) -> bool {
    encoded.contains(OFFERS_MARKER)
}

fn yaml_to_json(value: serde_yaml::Value) -> serde_json::Value {
    use serde_json::Value as Json;
    use serde_yaml::Value as Yaml;

    match value {
        Yaml::Null => Json::Null,
        Yaml::Bool(b) => Json::Bool(b),
        Yaml::Number(n) => number_to_json(&n),
        Yaml::String(s) => Json::String(s),
        Yaml::Sequence(seq) => Json::Array(seq.into_iter().map(yaml_to_json).collect()),
        Yaml::Mapping(map) => Json::Object(
            map.into_iter()
                .map(|(k, v)| (mapping_key(k), yaml_to_json(v)))
                .collect(),
        ),
        Yaml::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

fn number_to_json(n: &serde_yaml::Number) -> serde_json::Value {
    if let Some(i) = n.as_i64() {
        serde_json::Value::from(i)
    } else if let Some(u) = n.as_u64() {
        serde_json::Value::from(u)
    } else {
        n.as_f64()
            .and_then(serde_json::Number::from_f64)
            .map(serde_json::Value::Number)
            .unwrap_or_else(|| serde_json::Value::String(n.to_string()))
    }
}

/// JSON object keys must be strings; scalars are rendered as their JSON text.
fn mapping_key(key: serde_yaml::Value) -> String {
    match yaml_to_json(key) {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUNDLE: &str = r#"
series: jammy
applications:
  mysql:
    charm: mysql
    num_units: 1
relations: []
--- # overlay
applications:
  mysql:
    offers:
      db:
        endpoints: [database]
"#;

    #[test]
    fn test_multi_document_bundle() {
        let docs = bundle_documents(BUNDLE).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(
            docs[0],
            r#"{"series":"jammy","applications":{"mysql":{"charm":"mysql","num_units":1}},"relations":[]}"#
        );
        assert!(is_offers_document(&docs[1]));
        assert!(!is_offers_document(&docs[0]));
    }

    #[test]
    fn test_empty_bundle() {
        let docs = bundle_documents(EMPTY_BUNDLE).unwrap();
        assert_eq!(docs, vec!["{}".to_string()]);
    }

    #[test]
    fn test_blank_bundle_has_no_documents() {
        assert!(bundle_documents("").unwrap().is_empty());
        assert!(bundle_documents("  \n\n").unwrap().is_empty());
    }

    #[test]
    fn test_trailing_separator_yields_null_document() {
        let docs = bundle_documents("a: 1\n---\n").unwrap();
        assert_eq!(docs, vec![r#"{"a":1}"#.to_string(), "null".to_string()]);
    }

    #[test]
    fn test_offers_filter_is_textual() {
        assert!(is_offers_document(r#"{"relations":[],"offers":[{"name":"db"}]}"#));
        assert!(!is_offers_document(r#"{"relations":[],"applications":{"a":{}}}"#));
        // Mentions in unrelated values are excluded too.
        assert!(is_offers_document(r#"{"description":"special offers"}"#));
    }

    #[test]
    fn test_non_string_keys_are_stringified() {
        let docs = bundle_documents("1: a\ntrue: b\n").unwrap();
        assert_eq!(docs[0], r#"{"1":"a","true":"b"}"#);
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(bundle_documents("a: [unclosed").is_err());
    }
}
