//! Shared fixtures: an in-memory controller and archive readers.

#![allow(dead_code)]

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use inventory_collector::{
    ControllerConnection, ControllerConnector, ControllerError, ModelConnection, ModelRef,
};
use inventory_common::{
    Config, ControllerConfig, LoggingConfig, RunContext, Settings, TargetConfig,
};

pub const TIMESTAMP: &str = "20240102030405";

/// Scripted model served by [`FakeController`].
#[derive(Debug, Clone)]
pub struct FakeModel {
    pub name: String,
    pub status: Value,
    /// Bundle YAML, or the controller error message to raise.
    pub bundle: Result<String, String>,
}

impl FakeModel {
    pub fn new(name: &str, bundle: Result<&str, &str>) -> Self {
        Self {
            name: name.to_string(),
            status: serde_json::json!({ "model": { "name": name }, "applications": {} }),
            bundle: bundle.map(str::to_string).map_err(str::to_string),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    models: Vec<FakeModel>,
    connect_error: Option<String>,
    calls: Vec<String>,
}

/// In-memory controller recording every call it receives.
#[derive(Debug, Clone, Default)]
pub struct FakeController {
    state: Arc<Mutex<State>>,
}

impl FakeController {
    pub fn with_models(models: Vec<FakeModel>) -> Self {
        let controller = Self::default();
        controller.state.lock().unwrap().models = models;
        controller
    }

    pub fn refusing(message: &str) -> Self {
        let controller = Self::default();
        controller.state.lock().unwrap().connect_error = Some(message.to_string());
        controller
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: impl Into<String>) {
        self.state.lock().unwrap().calls.push(call.into());
    }
}

#[async_trait]
impl ControllerConnector for FakeController {
    type Connection = FakeConnection;

    async fn connect(&self, _config: &ControllerConfig) -> Result<FakeConnection, ControllerError> {
        self.record("connect");
        if let Some(message) = self.state.lock().unwrap().connect_error.clone() {
            return Err(ControllerError::api(message));
        }
        Ok(FakeConnection {
            controller: self.clone(),
        })
    }
}

pub struct FakeConnection {
    controller: FakeController,
}

#[async_trait]
impl ControllerConnection for FakeConnection {
    type Model = FakeModelConnection;

    async fn list_models(&mut self) -> Result<Vec<ModelRef>, ControllerError> {
        self.controller.record("list_models");
        let state = self.controller.state.lock().unwrap();
        // Reverse order: the session must not depend on controller ordering.
        Ok(state
            .models
            .iter()
            .rev()
            .map(|m| ModelRef::new(&m.name, format!("uuid-{}", m.name)))
            .collect())
    }

    async fn open_model(&mut self, model: &ModelRef) -> Result<FakeModelConnection, ControllerError> {
        self.controller.record(format!("open:{}", model.name));
        let found = self
            .controller
            .state
            .lock()
            .unwrap()
            .models
            .iter()
            .find(|m| m.name == model.name)
            .cloned()
            .ok_or_else(|| ControllerError::api(format!("model {} not found", model.name)))?;

        Ok(FakeModelConnection {
            controller: self.controller.clone(),
            model: found,
        })
    }

    async fn disconnect(self) -> Result<(), ControllerError> {
        self.controller.record("disconnect");
        Ok(())
    }
}

pub struct FakeModelConnection {
    controller: FakeController,
    model: FakeModel,
}

#[async_trait]
impl ModelConnection for FakeModelConnection {
    async fn status(&mut self) -> Result<Value, ControllerError> {
        self.controller.record(format!("status:{}", self.model.name));
        Ok(self.model.status.clone())
    }

    async fn export_bundle(&mut self) -> Result<String, ControllerError> {
        self.controller
            .record(format!("export_bundle:{}", self.model.name));
        self.model.bundle.clone().map_err(ControllerError::api)
    }

    async fn disconnect(self) -> Result<(), ControllerError> {
        self.controller.record(format!("close:{}", self.model.name));
        Ok(())
    }
}

pub fn settings(collection_path: &Path) -> Settings {
    Settings {
        collection_path: collection_path.to_path_buf(),
        customer: "acme".to_string(),
        site: "dc1".to_string(),
        abort_on_exporter_error: true,
        http_timeout_secs: Some(5),
    }
}

pub fn target(endpoint: &str, hostname: &str, model: &str) -> TargetConfig {
    TargetConfig {
        endpoint: endpoint.to_string(),
        hostname: hostname.to_string(),
        customer: "acme".to_string(),
        site: "dc1".to_string(),
        model: model.to_string(),
    }
}

pub fn controller_config() -> ControllerConfig {
    ControllerConfig {
        endpoint: "10.0.0.1:17070".to_string(),
        username: "admin".to_string(),
        password: "secret".to_string(),
        ca_cert: String::new(),
        tls_server_name: "juju-apiserver".to_string(),
    }
}

pub fn config(collection_path: &Path, targets: Vec<TargetConfig>, with_controller: bool) -> Config {
    Config {
        settings: settings(collection_path),
        juju_controller: with_controller.then(controller_config),
        models: Vec::new(),
        targets,
        logging: LoggingConfig::default(),
    }
}

pub fn context() -> RunContext {
    RunContext::with_timestamp(TIMESTAMP)
}

pub fn archive_path(dir: &Path, group: &str) -> PathBuf {
    context().archive_path(dir, "acme", "dc1", group)
}

/// All `(name, body)` entries of an archive, in order.
pub fn read_archive(path: &Path) -> Vec<(String, String)> {
    let file = std::fs::File::open(path).unwrap_or_else(|e| panic!("{}: {e}", path.display()));
    let mut archive = tar::Archive::new(file);
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let mut body = String::new();
            entry.read_to_string(&mut body).unwrap();
            (name, body)
        })
        .collect()
}

/// File names in `dir`, sorted.
pub fn files_in(dir: &Path) -> Vec<String> {
    if !dir.exists() {
        return Vec::new();
    }
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
