use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Global collection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory receiving archives and transient staging files.
    #[serde(default)]
    pub collection_path: PathBuf,

    /// Customer name used for controller model archives.
    #[serde(default)]
    pub customer: String,

    /// Site name used for controller model archives.
    #[serde(default)]
    pub site: String,

    /// Abort the whole run when an exporter feed cannot be fetched (default: true).
    /// When false, the failed feed is logged and skipped.
    #[serde(default = "default_true")]
    pub abort_on_exporter_error: bool,

    /// Per-request timeout for exporter HTTP calls. No timeout when unset.
    #[serde(default)]
    pub http_timeout_secs: Option<u64>,
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            collection_path: PathBuf::new(),
            customer: String::new(),
            site: String::new(),
            abort_on_exporter_error: default_true(),
            http_timeout_secs: None,
        }
    }
}

impl Settings {
    /// HTTP timeout as a duration, if configured.
    pub fn http_timeout(&self) -> Option<Duration> {
        self.http_timeout_secs.map(Duration::from_secs)
    }
}

/// Connection descriptor for the orchestration controller.
#[derive(Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Controller API address (e.g., "10.0.0.1:17070").
    #[serde(default)]
    pub endpoint: String,

    /// User to authenticate as.
    #[serde(default)]
    pub username: String,

    /// Password for `username`.
    #[serde(default)]
    pub password: String,

    /// PEM encoded CA certificate of the controller.
    #[serde(default)]
    pub ca_cert: String,

    /// Name verified against the controller certificate (default: "juju-apiserver").
    #[serde(default = "default_tls_server_name")]
    pub tls_server_name: String,
}

fn default_tls_server_name() -> String {
    "juju-apiserver".to_string()
}

impl fmt::Debug for ControllerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerConfig")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("ca_cert", &format_args!("<{} bytes>", self.ca_cert.len()))
            .field("tls_server_name", &self.tls_server_name)
            .finish()
    }
}

/// A single exporter to poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Exporter address as `host:port`.
    #[serde(default)]
    pub endpoint: String,

    /// Hostname recorded in staging entry names.
    #[serde(default)]
    pub hostname: String,

    /// Customer used in the archive name.
    #[serde(default)]
    pub customer: String,

    /// Site used in the archive name.
    #[serde(default)]
    pub site: String,

    /// Model group used in the archive name.
    #[serde(default, alias = "model_group")]
    pub model: String,
}

/// Complete collector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Collection settings.
    #[serde(default)]
    pub settings: Settings,

    /// Controller connection (controller collection is skipped when absent).
    #[serde(default)]
    pub juju_controller: Option<ControllerConfig>,

    /// Restrict controller collection to these models (empty = all models).
    #[serde(default)]
    pub models: Vec<String>,

    /// Exporters to poll, in order.
    #[serde(default)]
    pub targets: Vec<TargetConfig>,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn require(value: &str, key: impl FnOnce() -> String) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::missing_key(key()));
    }
    Ok(())
}

impl Config {
    /// Load configuration from a JSON5 file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(Error::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string and validate it.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate that every grouping field used for naming is present.
    pub fn validate(&self) -> Result<()> {
        if self.settings.collection_path.as_os_str().is_empty() {
            return Err(Error::missing_key("settings.collection_path"));
        }
        require(&self.settings.customer, || "settings.customer".into())?;
        require(&self.settings.site, || "settings.site".into())?;

        if self.settings.http_timeout_secs == Some(0) {
            return Err(Error::Config(
                "settings.http_timeout_secs must be > 0".to_string(),
            ));
        }

        if let Some(controller) = &self.juju_controller {
            require(&controller.endpoint, || "juju_controller.endpoint".into())?;
            require(&controller.username, || "juju_controller.username".into())?;
            require(&controller.ca_cert, || "juju_controller.ca_cert".into())?;
        }

        for (i, target) in self.targets.iter().enumerate() {
            require(&target.endpoint, || format!("targets[{i}].endpoint"))?;
            require(&target.hostname, || format!("targets[{i}].hostname"))?;
            require(&target.customer, || format!("targets[{i}].customer"))?;
            require(&target.site, || format!("targets[{i}].site"))?;
            require(&target.model, || format!("targets[{i}].model"))?;
        }

        Ok(())
    }

    /// Make sure the collection directory exists and is a directory.
    pub fn prepare_collection_path(&self) -> Result<&Path> {
        let path = self.settings.collection_path.as_path();
        std::fs::create_dir_all(path).map_err(|e| {
            Error::Config(format!(
                "Cannot create collection path '{}': {}",
                path.display(),
                e
            ))
        })?;
        debug!(path = %path.display(), "Collection path ready");
        Ok(path)
    }
}
