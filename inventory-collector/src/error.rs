//! Error types for the collector.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`CollectorError`].
pub type Result<T> = std::result::Result<T, CollectorError>;

/// Errors that abort a collection run.
#[derive(Error, Debug)]
pub enum CollectorError {
    /// Configuration or shared-layer error.
    #[error(transparent)]
    Common(#[from] inventory_common::Error),

    /// Controller unreachable or authentication rejected.
    #[error("Failed to connect to juju controller: {0}")]
    Connection(#[source] ControllerError),

    /// The controller's model list could not be fetched.
    #[error("Failed to list models: {0}")]
    Enumerate(#[source] ControllerError),

    /// An exporter feed could not be fetched.
    #[error("Failed to collect data from target '{hostname}' ({endpoint}/{feed}): {message}")]
    Exporter {
        hostname: String,
        endpoint: String,
        feed: String,
        message: String,
    },

    /// A controller call failed while collecting a model.
    #[error("Failed to collect model '{group}': {source}")]
    Controller {
        group: String,
        #[source]
        source: ControllerError,
    },

    /// A bundle could not be decoded.
    #[error("Failed to decode bundle of model '{group}': {message}")]
    Bundle { group: String, message: String },

    /// Appending to an archive failed. The staging file is left in place.
    #[error("Failed to append {staging} to {archive}: {source}")]
    Archive {
        archive: PathBuf,
        staging: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CollectorError {
    /// Wrap a controller error raised while working on `group`.
    pub fn controller(group: impl Into<String>, source: ControllerError) -> Self {
        Self::Controller {
            group: group.into(),
            source,
        }
    }
}

/// Errors raised by a controller RPC client.
#[derive(Error, Debug)]
pub enum ControllerError {
    /// Network or websocket failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// TLS setup failure (bad CA certificate, etc.).
    #[error("TLS error: {0}")]
    Tls(String),

    /// The controller answered with an error.
    #[error("{message}")]
    Api { message: String, code: Option<String> },

    /// The controller sent something unexpected.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ControllerError {
    /// Create an API error without a code.
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
            code: None,
        }
    }

    /// The controller's message, if this is an API error.
    pub fn api_message(&self) -> Option<&str> {
        match self {
            Self::Api { message, .. } => Some(message),
            _ => None,
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ControllerError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for ControllerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}
