//! Error types for welcome-gate.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Policy store errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors returned by the chat platform boundary.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("Missing access: {0}")]
    Forbidden(String),

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Platform API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl PlatformError {
    /// Whether the target object no longer exists (or never did).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Event ingest errors.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Failed to bind ingest listener on port {port}: {reason}")]
    Bind { port: u16, reason: String },

    #[error("Ingest server stopped: {0}")]
    Serve(String),

    #[error("Malformed event payload: {0}")]
    Malformed(String),
}
