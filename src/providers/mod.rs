//! External collaborator boundaries: language/embedding provider and blob storage
//!
//! The concrete LLM/embedding backend is never reimplemented here; it is
//! consumed through the narrow [`LanguageProvider`] trait.

pub mod blob;
pub mod http;

use async_trait::async_trait;
use thiserror::Error;

pub use blob::{BlobStore, LocalBlobStore};
pub use http::HttpLanguageProvider;

/// Provider failure classification
///
/// Callers can distinguish "provider absent" from "provider returned
/// nothing usable" from "provider errored" instead of collapsing all three
/// into a missing value.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network, auth, or rate-limit failure reaching the provider
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// The provider answered but returned no usable result
    #[error("Provider returned an empty result")]
    Empty,

    /// The provider answered with a response we could not interpret
    #[error("Malformed provider response: {0}")]
    Malformed(String),
}

/// Result type for provider operations
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Narrow interface to the external language/embedding backend
///
/// Every operation may fail or be unavailable; callers fall back locally
/// rather than propagate provider failures.
#[async_trait]
pub trait LanguageProvider: Send + Sync {
    /// Detect the language of a text, as a BCP-47-ish code ("en", "de", ...)
    async fn detect_language(&self, text: &str) -> ProviderResult<String>;

    /// Translate text from `source` to `target` language
    async fn translate(&self, text: &str, source: &str, target: &str) -> ProviderResult<String>;

    /// Summarize one chunk into bullet points
    async fn summarize_chunk(&self, text: &str) -> ProviderResult<Vec<String>>;

    /// Reduce per-chunk summaries into one document summary
    async fn reduce_summaries(&self, summaries: &[String]) -> ProviderResult<String>;

    /// Generate embeddings for a batch of texts
    async fn embed_many(&self, texts: &[String]) -> ProviderResult<Vec<Vec<f32>>>;

    /// Provider name for logging
    fn name(&self) -> &str;
}
