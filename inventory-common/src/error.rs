use thiserror::Error;

/// Common error type for inventory collector components.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    #[error("Config is missing required key '{0}'")]
    ConfigValidation(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a validation error for a missing or empty key.
    pub fn missing_key(key: impl Into<String>) -> Self {
        Self::ConfigValidation(key.into())
    }
}

impl From<json5::Error> for Error {
    fn from(err: json5::Error) -> Self {
        Self::ConfigParse(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
