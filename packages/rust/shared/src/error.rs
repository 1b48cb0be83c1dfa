//! Error types for diagflow.
//!
//! Library crates use [`DiagflowError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum DiagflowError {
    /// A required input artifact or file does not exist.
    #[error("not found: {what} at {location}")]
    NotFound { what: String, location: String },

    /// An expected column is absent or the table/artifact shape is wrong.
    #[error("schema error: {message}")]
    Schema { message: String },

    /// Missing or invalid values in required columns.
    #[error("data quality error: {message}")]
    DataQuality { message: String },

    /// Invalid stage configuration.
    #[error("config error: {message}")]
    Config { message: String },

    /// Export mode other than `local` or `remote`.
    #[error("unsupported export mode '{0}': expected 'local' or 'remote'")]
    UnsupportedMode(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Artifact could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Network/HTTP error while talking to a remote destination.
    #[error("network error: {0}")]
    Network(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DiagflowError>;

impl DiagflowError {
    /// Create a not-found error for a named input at a location.
    pub fn not_found(what: impl Into<String>, location: impl Into<String>) -> Self {
        Self::NotFound {
            what: what.into(),
            location: location.into(),
        }
    }

    /// Create a schema error from any displayable message.
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema {
            message: msg.into(),
        }
    }

    /// Create a data quality error from any displayable message.
    pub fn data_quality(msg: impl Into<String>) -> Self {
        Self::DataQuality {
            message: msg.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable error kind name surfaced to operators.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NotFound",
            Self::Schema { .. } => "SchemaError",
            Self::DataQuality { .. } => "DataQualityError",
            Self::Config { .. } => "ConfigError",
            Self::UnsupportedMode(_) => "UnsupportedMode",
            Self::Io { .. } => "IoError",
            Self::Serialization(_) => "SerializationError",
            Self::Network(_) => "NetworkError",
        }
    }

    /// Whether a retry could plausibly succeed.
    ///
    /// Schema, data-quality and configuration failures are permanent.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Network(_))
    }
}
