//! Error types for the audit engine

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for audit operations
pub type Result<T> = std::result::Result<T, AuditError>;

/// Main error type for audit operations
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Failed to parse registry metadata: {0}")]
    ParseError(String),

    /// The registry could not be reached. `source` is set when the failure
    /// came from the HTTP stack rather than from this crate.
    #[error("Network error: {message}")]
    NetworkError {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("API error from {service}: {message}")]
    ApiError { service: String, message: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("Rate limit exceeded for {service}. Retry after: {retry_after:?}")]
    RateLimitExceeded {
        service: String,
        retry_after: Option<std::time::Duration>,
    },

    #[error("Package not found: {0}")]
    PackageNotFound(String),

    /// The trust store no longer matches its signature. Nothing may be
    /// audited until the operator re-signs.
    #[error("Trust store {} has been modified outside of this tool (signature mismatch)", path.display())]
    IntegrityBreach { path: PathBuf },
}

impl AuditError {
    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::NetworkError {
            message: msg.into(),
            source: None,
        }
    }

    /// Wrap a transport failure from the HTTP client
    pub fn transport(context: impl Into<String>, source: reqwest::Error) -> Self {
        Self::NetworkError {
            message: format!("{}: {}", context.into(), source),
            source: Some(source),
        }
    }

    /// Create an API error
    pub fn api(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ApiError {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Whether this error means the package simply does not exist upstream
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::PackageNotFound(_))
    }
}
