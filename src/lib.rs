//! docpipe: asynchronous document ingestion with versioned storage
//!
//! Uploads are normalized into searchable text, chunked, embedded (with a
//! content-hash cache, a bounded worker pool, and a deterministic local
//! fallback), and persisted as versioned, soft-deletable documents.
//! Re-uploads of unchanged content are deduplicated by cosine similarity;
//! changed content produces an auditable new version. Processing is
//! asynchronous: jobs move through a queue and worker pool, observable via
//! status polling and per-session push notifications.

pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod ingestion;
pub mod notify;
pub mod processing;
pub mod providers;
pub mod storage;
pub mod types;
pub mod versioning;

pub use config::IngestConfig;
pub use engine::{IngestEngine, SubmitRequest};
pub use error::{Error, Result};
pub use types::{
    Chunk, ContentKind, DeletionLogEntry, Document, IngestJob, JobErrorCode, JobNotification,
    JobStatus, ProgressStage, VersionSnapshot,
};
