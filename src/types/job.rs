//! Ingestion job record, state machine enums, and notification payload

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::document::ContentKind;

/// Job status
///
/// `Ready` and `Failed` are terminal; a job in a terminal state never
/// progresses again and must be resubmitted as a new job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Ready,
    Failed,
}

impl JobStatus {
    /// Whether this status stops further automatic progress
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

/// Failure taxonomy written onto failed jobs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobErrorCode {
    /// Source bytes unavailable in the blob store
    PayloadMissing,
    /// Malformed, oversized, empty, or unsupported input
    ValidationError,
    /// A pipeline stage reported a structured failure
    PipelineError,
    /// Unexpected internal fault
    IngestException,
}

impl JobErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PayloadMissing => "payload_missing",
            Self::ValidationError => "validation_error",
            Self::PipelineError => "pipeline_error",
            Self::IngestException => "ingest_exception",
        }
    }
}

/// Pipeline progress stage, pushed to subscribers after each stage completes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    Queued,
    Parsed,
    Translated,
    Chunked,
    Embedding,
    Stored,
    Ready,
    Failed,
}

impl ProgressStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Parsed => "parsed",
            Self::Translated => "translated",
            Self::Chunked => "chunked",
            Self::Embedding => "embedding",
            Self::Stored => "stored",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

/// Typed metadata carried on a job record
///
/// Known fields are first-class; anything else a caller attaches rides in
/// `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analytics: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concepts: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_stage: Option<ProgressStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_preview: Option<String>,
    /// Content hash of the normalized text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_hash: Option<String>,
    /// Client-provided signature, echoed back untouched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_signature: Option<String>,
    /// Document the job resolved to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<Uuid>,
    /// Cosine similarity against the previously stored embedding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f32>,
    /// Whether the upload produced a content-changing write
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reprocessed: Option<bool>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// One row per submitted upload
///
/// Created on submission, mutated only by the worker executing it, never
/// deleted (kept for audit).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestJob {
    pub id: Uuid,
    pub user_id: String,
    pub session_id: String,
    pub filename: String,
    pub content_kind: ContentKind,
    pub file_size_bytes: u64,
    pub storage_path: String,
    pub status: JobStatus,
    pub error_code: Option<JobErrorCode>,
    pub error_message: Option<String>,
    /// Reference to the embedding recorded for the document
    pub embedding_id: Option<Uuid>,
    /// Set when no embedding could be obtained; signals a deferred backfill
    pub needs_embedding: bool,
    /// Dispatch count; exposed for an operator or higher-level scheduler
    pub attempts: u32,
    pub metadata: JobMetadata,
    pub queued_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl IngestJob {
    /// Create a queued job for a stored payload
    pub fn new(
        user_id: String,
        session_id: String,
        filename: String,
        content_kind: ContentKind,
        file_size_bytes: u64,
        storage_path: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            session_id,
            filename,
            content_kind,
            file_size_bytes,
            storage_path,
            status: JobStatus::Queued,
            error_code: None,
            error_message: None,
            embedding_id: None,
            needs_embedding: true,
            attempts: 0,
            metadata: JobMetadata::default(),
            queued_at: chrono::Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }
}

/// Serialized job record pushed to per-session subscribers
///
/// Field names are camelCase on the wire; delivery is best-effort and
/// at-most-once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobNotification {
    pub id: Uuid,
    pub session_id: String,
    pub filename: String,
    pub file_type: String,
    pub file_size_bytes: u64,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<JobErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub queued_at: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analytics: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concepts: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rag_document_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_stage: Option<ProgressStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_signature: Option<String>,
}

impl JobNotification {
    /// Build the wire payload from a job record
    pub fn from_job(job: &IngestJob) -> Self {
        Self {
            id: job.id,
            session_id: job.session_id.clone(),
            filename: job.filename.clone(),
            file_type: job.content_kind.as_str().to_string(),
            file_size_bytes: job.file_size_bytes,
            status: job.status,
            error_code: job.error_code,
            error_message: job.error_message.clone(),
            queued_at: job.queued_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
            summary: job.metadata.summary.clone(),
            analytics: job.metadata.analytics.clone(),
            concepts: job.metadata.concepts.clone(),
            language: job.metadata.language.clone(),
            processed_preview: job.metadata.processed_preview.clone(),
            rag_document_id: job.metadata.document_id,
            progress_stage: job.metadata.progress_stage,
            progress_detail: job.metadata.progress_detail.clone(),
            file_hash: job.metadata.file_hash.clone(),
            client_signature: job.metadata.client_signature.clone(),
        }
    }
}
