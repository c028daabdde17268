//! Configuration for the ingestion pipeline

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Top-level pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Normalizer limits
    #[serde(default)]
    pub normalizer: NormalizerConfig,
    /// Chunking configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// Embedding client configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// External provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Storage paths
    #[serde(default)]
    pub storage: StorageConfig,
    /// Job processing configuration
    #[serde(default)]
    pub processing: ProcessingConfig,
    /// Retention sweep configuration
    #[serde(default)]
    pub retention: RetentionConfig,
}

impl IngestConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))
    }
}

/// Normalizer limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// Hard byte ceiling, checked before any decoding
    pub max_input_bytes: usize,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            max_input_bytes: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Token budget per chunk; tokens approximated as ceil(chars / 4)
    pub token_limit: usize,
    /// Window size in characters for the fixed-window fallback
    pub window_chars: usize,
    /// Window overlap in characters (must be < window_chars)
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            token_limit: 256,
            window_chars: 1024,
            overlap_chars: 128,
        }
    }
}

/// Embedding client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Vector dimension
    pub dimensions: usize,
    /// Number of embedding worker tasks
    pub workers: Option<usize>,
    /// Client-visible timeout for one embedding request in seconds
    pub request_timeout_secs: u64,
    /// Maximum cache entries before LRU eviction
    pub cache_entries: usize,
    /// Cache entry time-to-live in seconds
    pub cache_ttl_secs: u64,
    /// Whether the deterministic local fallback may be used when the
    /// provider is unavailable
    #[serde(default = "default_allow_fallback")]
    pub allow_fallback: bool,
}

fn default_allow_fallback() -> bool {
    true
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimensions: 384,
            workers: None, // Auto-detect from CPU count
            request_timeout_secs: 30,
            cache_entries: 4096,
            cache_ttl_secs: 3600,
            allow_fallback: true,
        }
    }
}

/// External provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the provider HTTP API
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Number of retries for failed requests
    pub max_retries: u32,
    /// Canonical language documents are normalized to
    pub canonical_language: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            timeout_secs: 60,
            max_retries: 2,
            canonical_language: "en".to_string(),
        }
    }
}

/// Storage paths
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path
    pub database_path: PathBuf,
    /// Directory for raw payload blobs
    pub blob_dir: PathBuf,
    /// Byte ceiling for content snapshots stored with version history
    pub snapshot_max_bytes: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("docpipe");

        Self {
            database_path: data_dir.join("docpipe.db"),
            blob_dir: data_dir.join("blobs"),
            snapshot_max_bytes: 16 * 1024,
        }
    }
}

/// Job processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Number of job workers
    pub workers: Option<usize>,
    /// Debounce window for per-(owner, session) cache priming, in seconds
    pub debounce_secs: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            workers: None, // Auto-detect from CPU count
            debounce_secs: 30,
        }
    }
}

/// Retention sweep configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Grace period before hard-deleting soft-deleted documents, in days
    pub grace_days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { grace_days: 30 }
    }
}
