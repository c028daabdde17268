//! Error types for the ingestion pipeline

use thiserror::Error;
use uuid::Uuid;

use crate::ingestion::NormalizeError;
use crate::providers::ProviderError;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input failed validation/normalization
    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    /// Source payload bytes could not be read
    #[error("Payload missing at '{0}'")]
    PayloadMissing(String),

    /// External provider failure (already classified)
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Embedding request exceeded its timeout
    #[error("Embedding request timed out after {0}s")]
    EmbeddingTimeout(u64),

    /// No embedding could be obtained from provider or fallback
    #[error("No embedding available from provider or local fallback")]
    EmbeddingUnavailable,

    /// Optimistic version check failed during a concurrent overwrite
    #[error("Version conflict on '{name}': expected version {expected}")]
    VersionConflict { name: String, expected: i64 },

    /// Document not found
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// Job not found
    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a database error
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(err.to_string())
    }
}
