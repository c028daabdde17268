//! Core data types for documents, versions, and ingestion jobs

pub mod document;
pub mod job;

pub use document::{Chunk, ContentKind, DeletionLogEntry, Document, VersionSnapshot};
pub use job::{
    IngestJob, JobErrorCode, JobMetadata, JobNotification, JobStatus, ProgressStage,
};
