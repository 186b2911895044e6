//! Error types for the quote inbox pipeline.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Document store errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    /// An ordered query needs a secondary index that this environment lacks.
    #[error("Index unavailable on {collection}: {reason}")]
    IndexUnavailable { collection: String, reason: String },
}

/// Model provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} is not configured: {reason}")]
    NotConfigured { provider: String, reason: String },

    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },
}

/// Structured extraction errors. All of them route to the heuristic fallback.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("No model client available (credentials missing or client init failed)")]
    ClientUnavailable,

    #[error("Model call failed: {0}")]
    Model(#[from] LlmError),

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Failed to parse model output: {reason}")]
    Parse { reason: String, raw_preview: String },
}

/// Pipeline-level errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Invalid quote response status: {0}")]
    InvalidStatus(String),

    #[error("Mail parsing failed: {0}")]
    Mail(String),

    #[error("Attachment text extraction failed: {0}")]
    Attachments(String),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
