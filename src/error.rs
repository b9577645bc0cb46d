use std::path::PathBuf;

use thiserror::Error;

/// Message shown in a result panel for any failure the service did not explain.
pub const GENERIC_PANEL_MESSAGE: &str = "There was an error";

/// Main application error type that encompasses all possible failure modes
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status error: {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Request timeout: {url} after {timeout_seconds} seconds")]
    Timeout { url: String, timeout_seconds: u64 },

    /// Structured error payload returned by the service (HTTP 422 from `format`)
    #[error("Service reported an error: {message}")]
    ServiceReported { message: String },

    #[error("Invalid response from {url}: {details}")]
    InvalidResponse { url: String, details: String },

    #[error("Invalid file extension: expected {expected}, found {actual} ({path})")]
    InvalidFileExtension {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    /// The request was superseded. Not a failure; never shown to the user.
    #[error("Request cancelled")]
    Cancelled,
}

impl ValidationError {
    /// True for the cancellation no-op, which callers swallow.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ValidationError::Cancelled)
    }

    /// Text displayed inline in a result or error panel.
    pub fn panel_message(&self) -> String {
        match self {
            ValidationError::ServiceReported { message } => format!("ERROR: {}", message),
            _ => GENERIC_PANEL_MESSAGE.to_string(),
        }
    }
}

/// Configuration-specific error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

impl From<ConfigError> for ValidationError {
    fn from(err: ConfigError) -> Self {
        ValidationError::Config(err.to_string())
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ValidationError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
