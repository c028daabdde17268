//! Document, version snapshot, and deletion audit types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Declared content kind of an uploaded payload
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// Plain UTF-8 text
    PlainText,
    /// Delimited table (CSV and friends)
    DelimitedTable,
    /// Spreadsheet workbook (xlsx/ods)
    Spreadsheet,
    /// Structured JSON value
    StructuredJson,
    /// Free-form prose with no declared structure
    FreeText,
}

impl ContentKind {
    /// Detect kind from a filename extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "txt" | "text" | "md" | "markdown" => Self::PlainText,
            "csv" | "tsv" => Self::DelimitedTable,
            "xlsx" | "xls" | "ods" => Self::Spreadsheet,
            "json" => Self::StructuredJson,
            _ => Self::FreeText,
        }
    }

    /// Stable string form used in persistence and notifications
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlainText => "plain_text",
            Self::DelimitedTable => "delimited_table",
            Self::Spreadsheet => "spreadsheet",
            Self::StructuredJson => "structured_json",
            Self::FreeText => "free_text",
        }
    }
}

impl std::str::FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "plain_text" => Ok(Self::PlainText),
            "delimited_table" => Ok(Self::DelimitedTable),
            "spreadsheet" => Ok(Self::Spreadsheet),
            "structured_json" => Ok(Self::StructuredJson),
            "free_text" => Ok(Self::FreeText),
            other => Err(format!("unknown content kind '{}'", other)),
        }
    }
}

/// The current, addressable version of an ingested document
///
/// Keyed by `(owner_id, name)`; the version number starts at 1 on first
/// insert and increases by exactly 1 on every content-changing update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique document ID
    pub id: Uuid,
    /// Owning user account
    pub owner_id: String,
    /// Logical document name (identity key together with owner)
    pub name: String,
    /// Path of the stored original payload in the blob store
    pub storage_path: String,
    /// Declared content kind
    pub content_kind: ContentKind,
    /// Classification/sensitivity tags
    pub tags: Vec<String>,
    /// Original (pre-normalization) text
    pub original_content: String,
    /// Normalized, searchable text
    pub content: String,
    /// Structured content metadata (row counts, columns, analytics)
    pub content_meta: HashMap<String, serde_json::Value>,
    /// Current embedding vector
    pub embedding: Option<Vec<f32>>,
    /// Embedding of the previous version, kept for comparison/audit
    pub previous_embedding: Option<Vec<f32>>,
    /// Monotonically increasing version number
    pub version: i64,
    /// Whether the last write changed the embedding
    pub embedding_changed: bool,
    /// Soft-delete flag
    pub deleted: bool,
    /// When the document was soft-deleted
    pub deleted_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Who soft-deleted it
    pub deleted_by: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Document {
    /// Create a first-version document (not yet persisted)
    pub fn new(owner_id: String, name: String, content_kind: ContentKind) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name,
            storage_path: String::new(),
            content_kind,
            tags: Vec::new(),
            original_content: String::new(),
            content: String::new(),
            content_meta: HashMap::new(),
            embedding: None,
            previous_embedding: None,
            version: 1,
            embedding_changed: false,
            deleted: false,
            deleted_at: None,
            deleted_by: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Immutable record of a document's state before an overwrite
///
/// Carries the version number *prior* to the increment; created exactly once
/// per overwrite and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionSnapshot {
    pub document_id: Uuid,
    /// Version number the document had before the overwrite
    pub version: i64,
    /// Embedding the document had before the overwrite
    pub embedding: Option<Vec<f32>>,
    /// Content snapshot, truncated to the configured ceiling
    pub content_snapshot: String,
    /// Metadata snapshot at overwrite time
    pub metadata: HashMap<String, serde_json::Value>,
    /// Who triggered the overwrite
    pub created_by: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Append-only audit record written at soft-delete time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionLogEntry {
    pub document_id: Uuid,
    pub name: String,
    pub deleted_by: String,
    pub reason: Option<String>,
    /// Metadata snapshot captured before it is cleared from the document
    pub metadata: HashMap<String, serde_json::Value>,
    pub content_kind: ContentKind,
    pub file_size: u64,
    pub deleted_at: chrono::DateTime<chrono::Utc>,
}

/// A bounded segment of normalized text, produced for embedding
///
/// Chunks live for the duration of one pipeline run; they are not persisted.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Unique chunk ID
    pub id: Uuid,
    /// Position within the document, strictly increasing from 0
    pub ordinal: u32,
    /// Text content
    pub text: String,
    /// Embedding vector, filled in by the embedding stage
    pub embedding: Option<Vec<f32>>,
}

impl Chunk {
    /// Create a new chunk at the given ordinal
    pub fn new(ordinal: u32, text: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            ordinal,
            text,
            embedding: None,
        }
    }
}
