//! Controller session management.
//!
//! The RPC client is pluggable through [`ControllerConnector`]. The session
//! wrapper enforces the call order the controller expects:
//!
//! ```text
//! Disconnected --open--> Connected --open_group--> GroupOpen --close--> Connected
//!                            |
//!                            +--close--> Disconnected
//! ```
//!
//! A [`GroupSession`] mutably borrows its [`ControllerSession`], so only one
//! model is open at a time and the controller cannot be closed underneath it.

use std::marker::PhantomData;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use inventory_common::ControllerConfig;

use crate::error::{CollectorError, ControllerError, Result};

/// A model known to the controller.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ModelRef {
    /// Model name, used for archive naming.
    pub name: String,
    /// Model UUID, used to address the model API.
    pub uuid: String,
}

impl ModelRef {
    pub fn new(name: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uuid: uuid.into(),
        }
    }
}

/// Establishes authenticated controller connections.
#[async_trait]
pub trait ControllerConnector: Send + Sync {
    type Connection: ControllerConnection;

    /// Connect and authenticate against the controller.
    async fn connect(
        &self,
        config: &ControllerConfig,
    ) -> std::result::Result<Self::Connection, ControllerError>;
}

/// An authenticated controller-level connection.
#[async_trait]
pub trait ControllerConnection: Send {
    type Model: ModelConnection;

    /// All models visible to the authenticated user. Order is not meaningful.
    async fn list_models(&mut self) -> std::result::Result<Vec<ModelRef>, ControllerError>;

    /// Open a connection scoped to one model.
    async fn open_model(
        &mut self,
        model: &ModelRef,
    ) -> std::result::Result<Self::Model, ControllerError>;

    /// Close the controller connection.
    async fn disconnect(self) -> std::result::Result<(), ControllerError>;
}

/// A connection scoped to one model.
#[async_trait]
pub trait ModelConnection: Send {
    /// Current model status.
    async fn status(&mut self) -> std::result::Result<serde_json::Value, ControllerError>;

    /// Exportable bundle as (possibly multi-document) YAML text.
    async fn export_bundle(&mut self) -> std::result::Result<String, ControllerError>;

    /// Close the model connection.
    async fn disconnect(self) -> std::result::Result<(), ControllerError>;
}

/// A connected controller session.
pub struct ControllerSession<C: ControllerConnection> {
    connection: C,
    endpoint: String,
}

impl<C: ControllerConnection> ControllerSession<C> {
    /// Connect to the controller described by `config`.
    ///
    /// Failure maps to [`CollectorError::Connection`].
    pub async fn open<K>(connector: &K, config: &ControllerConfig) -> Result<Self>
    where
        K: ControllerConnector<Connection = C>,
    {
        info!(endpoint = %config.endpoint, user = %config.username, "Connecting to controller");

        let connection = connector
            .connect(config)
            .await
            .map_err(CollectorError::Connection)?;

        info!(endpoint = %config.endpoint, "Connected to controller");

        Ok(Self {
            connection,
            endpoint: config.endpoint.clone(),
        })
    }

    /// Controller endpoint this session is connected to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Enumerate models, sorted by name for a stable iteration order.
    pub async fn groups(&mut self) -> Result<Vec<ModelRef>> {
        let mut models = self
            .connection
            .list_models()
            .await
            .map_err(CollectorError::Enumerate)?;
        models.sort();

        debug!(count = models.len(), "Enumerated models");
        Ok(models)
    }

    /// Open a model-scoped session.
    pub async fn open_group(&mut self, model: &ModelRef) -> Result<GroupSession<'_, C>> {
        let connection = self
            .connection
            .open_model(model)
            .await
            .map_err(|e| CollectorError::controller(&model.name, e))?;

        debug!(model = %model.name, "Opened model");

        Ok(GroupSession {
            connection,
            name: model.name.clone(),
            _session: PhantomData,
        })
    }

    /// Disconnect from the controller. Failures are logged, not returned.
    pub async fn close(self) {
        match self.connection.disconnect().await {
            Ok(()) => info!(endpoint = %self.endpoint, "Disconnected from controller"),
            Err(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "Error disconnecting from controller")
            }
        }
    }
}

/// A model opened through a [`ControllerSession`].
pub struct GroupSession<'a, C: ControllerConnection> {
    connection: C::Model,
    name: String,
    _session: PhantomData<&'a mut C>,
}

impl<C: ControllerConnection> GroupSession<'_, C> {
    /// Model name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current model status.
    pub async fn status(&mut self) -> std::result::Result<serde_json::Value, ControllerError> {
        self.connection.status().await
    }

    /// Exportable bundle YAML.
    pub async fn export_bundle(&mut self) -> std::result::Result<String, ControllerError> {
        self.connection.export_bundle().await
    }

    /// Release the model connection. Failures are logged, not returned.
    pub async fn close(self) {
        if let Err(e) = self.connection.disconnect().await {
            warn!(model = %self.name, error = %e, "Error disconnecting from model");
        }
    }
}

/// Verify the controller is reachable: connect, then disconnect.
pub async fn dry_run<K: ControllerConnector>(connector: &K, config: &ControllerConfig) -> Result<()> {
    let session = ControllerSession::open(connector, config).await?;
    session.close().await;
    Ok(())
}
