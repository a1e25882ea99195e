//! Error types for value handling and template expansion.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while layering values or expanding templates.
#[derive(Debug, Error)]
pub enum Error {
    /// A template failed to parse or render
    #[error("expand {template}: {message}")]
    Render {
        /// Template name (usually its path)
        template: String,
        /// Engine error, including the line when known
        message: String,
    },

    /// A postcondition expression failed to compile or evaluate
    #[error("expression `{expr}`: {message}")]
    Expression {
        /// Expression text
        expr: String,
        /// Engine error
        message: String,
    },

    /// Values input was not a mapping
    #[error("values must be a mapping, got: {0}")]
    NotAMapping(String),

    /// A `key=value` assignment was malformed
    #[error("expected key=value, got: {0}")]
    Assignment(String),

    /// Secret lookup failed
    #[error("secret {key}: {message}")]
    Secret {
        /// Secret name
        key: String,
        /// What went wrong
        message: String,
    },

    /// A file could not be read
    #[error("read {path}: {source}")]
    Read {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Invalid glob pattern
    #[error("glob pattern: {0}")]
    Glob(#[from] globset::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a secret lookup error.
    pub fn secret(key: &str, message: impl Into<String>) -> Self {
        Self::Secret {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Result type for template operations.
pub type Result<T> = std::result::Result<T, Error>;
