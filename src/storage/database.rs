//! SQLite store for documents, version history, deletion audit, and jobs
//!
//! One connection behind a mutex; every multi-statement write runs in an
//! explicit transaction so a version snapshot and its document overwrite
//! land (or roll back) together.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{
    ContentKind, DeletionLogEntry, Document, IngestJob, JobErrorCode, JobMetadata, JobStatus,
    VersionSnapshot,
};

/// New content for an insert or overwrite
#[derive(Debug, Clone)]
pub struct DocumentWrite {
    pub storage_path: String,
    pub content_kind: ContentKind,
    pub tags: Vec<String>,
    pub original_content: String,
    pub content: String,
    pub content_meta: HashMap<String, serde_json::Value>,
    pub embedding: Option<Vec<f32>>,
}

/// Store-level statistics for operators
#[derive(Debug, Clone, serde::Serialize)]
pub struct StoreStats {
    pub active_documents: usize,
    pub deleted_documents: usize,
    pub snapshots: usize,
    pub jobs: usize,
}

/// SQLite-backed document and job store
pub struct DocumentDb {
    conn: Mutex<Connection>,
    snapshot_max_bytes: usize,
}

impl DocumentDb {
    /// Open (or create) the database and run idempotent migrations
    pub fn open<P: AsRef<Path>>(path: P, snapshot_max_bytes: usize) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| Error::database(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
            snapshot_max_bytes,
        };
        db.migrate()?;
        Ok(db)
    }

    /// In-memory database for tests
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::database(format!("Failed to open in-memory database: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
            snapshot_max_bytes: 16 * 1024,
        };
        db.migrate()?;
        Ok(db)
    }

    /// Run idempotent schema migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA foreign_keys=ON;
        "#,
        )
        .map_err(|e| Error::database(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(
            r#"
            -- Current document versions, one row per (owner, name)
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                name TEXT NOT NULL,
                storage_path TEXT NOT NULL,
                content_kind TEXT NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                original_content TEXT NOT NULL,
                content TEXT NOT NULL,
                content_meta TEXT,
                embedding BLOB,
                previous_embedding BLOB,
                version INTEGER NOT NULL DEFAULT 1,
                embedding_changed INTEGER NOT NULL DEFAULT 0,
                deleted INTEGER NOT NULL DEFAULT 0,
                deleted_at TEXT,
                deleted_by TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(owner_id, name)
            );

            CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents(owner_id);
            CREATE INDEX IF NOT EXISTS idx_documents_deleted ON documents(deleted);

            -- Immutable pre-overwrite snapshots
            CREATE TABLE IF NOT EXISTS document_versions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                embedding BLOB,
                content_snapshot TEXT NOT NULL,
                metadata TEXT,
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_document_versions_doc
                ON document_versions(document_id);

            -- Append-only soft-delete audit trail
            CREATE TABLE IF NOT EXISTS deletion_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id TEXT NOT NULL,
                name TEXT NOT NULL,
                deleted_by TEXT NOT NULL,
                reason TEXT,
                metadata TEXT,
                content_kind TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                deleted_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_deletion_log_doc ON deletion_log(document_id);

            -- Ingestion jobs; kept forever for audit
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                session_id TEXT NOT NULL,
                filename TEXT NOT NULL,
                content_kind TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                storage_path TEXT NOT NULL,
                status TEXT NOT NULL,
                error_code TEXT,
                error_message TEXT,
                embedding_id TEXT,
                needs_embedding INTEGER NOT NULL DEFAULT 1,
                attempts INTEGER NOT NULL DEFAULT 0,
                metadata TEXT,
                queued_at TEXT NOT NULL,
                started_at TEXT,
                finished_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_session ON jobs(session_id);
            CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
        "#,
        )
        .map_err(|e| Error::database(format!("Failed to run migrations: {}", e)))?;

        tracing::info!("Database migrations complete");
        Ok(())
    }

    // ==================== Document Operations ====================

    /// Insert a first-version document
    pub fn insert_document(&self, doc: &Document) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            r#"
            INSERT INTO documents (
                id, owner_id, name, storage_path, content_kind, tags,
                original_content, content, content_meta, embedding,
                previous_embedding, version, embedding_changed, deleted,
                deleted_at, deleted_by, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
            "#,
            params![
                doc.id.to_string(),
                doc.owner_id,
                doc.name,
                doc.storage_path,
                doc.content_kind.as_str(),
                serde_json::to_string(&doc.tags)?,
                doc.original_content,
                doc.content,
                serde_json::to_string(&doc.content_meta)?,
                doc.embedding.as_deref().map(vec_to_blob),
                doc.previous_embedding.as_deref().map(vec_to_blob),
                doc.version,
                doc.embedding_changed as i64,
                doc.deleted as i64,
                doc.deleted_at.map(|t| t.to_rfc3339()),
                doc.deleted_by,
                doc.created_at.to_rfc3339(),
                doc.updated_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    /// Get a document by ID
    pub fn get_document(&self, id: &Uuid) -> Result<Option<Document>> {
        let conn = self.conn.lock();
        query_document(&conn, "WHERE id = ?1", params![id.to_string()])
    }

    /// Get the current document under an identity key
    ///
    /// Soft-deleted documents are returned too: a re-upload against a
    /// deleted name revives the document through the normal version path.
    pub fn get_by_owner_and_name(&self, owner_id: &str, name: &str) -> Result<Option<Document>> {
        let conn = self.conn.lock();
        query_document(
            &conn,
            "WHERE owner_id = ?1 AND name = ?2",
            params![owner_id, name],
        )
    }

    /// Snapshot the current state and overwrite with new content, bumping
    /// the version by exactly one
    ///
    /// The snapshot carries the version number prior to the increment. The
    /// whole sequence is one transaction guarded by an optimistic version
    /// check: a concurrent writer that read the same version loses with
    /// `Error::VersionConflict` instead of silently clobbering the snapshot.
    pub fn overwrite_with_version(
        &self,
        id: &Uuid,
        expected_version: i64,
        write: &DocumentWrite,
        actor: &str,
    ) -> Result<Document> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let current = query_document(&tx, "WHERE id = ?1", params![id.to_string()])?
            .ok_or_else(|| Error::DocumentNotFound(id.to_string()))?;

        if current.version != expected_version {
            return Err(Error::VersionConflict {
                name: current.name,
                expected: expected_version,
            });
        }

        let now = Utc::now();
        let snapshot_content = truncate_to_boundary(&current.content, self.snapshot_max_bytes);

        tx.execute(
            r#"
            INSERT INTO document_versions (
                document_id, version, embedding, content_snapshot,
                metadata, created_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                current.id.to_string(),
                current.version,
                current.embedding.as_deref().map(vec_to_blob),
                snapshot_content,
                serde_json::to_string(&current.content_meta)?,
                actor,
                now.to_rfc3339(),
            ],
        )?;

        let embedding_changed = current.embedding != write.embedding;
        let updated = tx.execute(
            r#"
            UPDATE documents SET
                storage_path = ?3,
                content_kind = ?4,
                tags = ?5,
                original_content = ?6,
                content = ?7,
                content_meta = ?8,
                previous_embedding = embedding,
                embedding = ?9,
                version = version + 1,
                embedding_changed = ?10,
                deleted = 0,
                deleted_at = NULL,
                deleted_by = NULL,
                updated_at = ?11
            WHERE id = ?1 AND version = ?2
            "#,
            params![
                id.to_string(),
                expected_version,
                write.storage_path,
                write.content_kind.as_str(),
                serde_json::to_string(&write.tags)?,
                write.original_content,
                write.content,
                serde_json::to_string(&write.content_meta)?,
                write.embedding.as_deref().map(vec_to_blob),
                embedding_changed as i64,
                now.to_rfc3339(),
            ],
        )?;

        if updated == 0 {
            // Another writer got in between the read and the update
            return Err(Error::VersionConflict {
                name: current.name,
                expected: expected_version,
            });
        }

        tx.commit()?;
        drop(conn);

        self.get_document(id)?
            .ok_or_else(|| Error::DocumentNotFound(id.to_string()))
    }

    /// Mark a document deleted without destroying its content
    ///
    /// Clears the searchable metadata, preserves everything else, and writes
    /// one `DeletionLogEntry` in the same transaction.
    pub fn soft_delete(&self, id: &Uuid, actor: &str, reason: Option<&str>) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let doc = query_document(&tx, "WHERE id = ?1", params![id.to_string()])?
            .ok_or_else(|| Error::DocumentNotFound(id.to_string()))?;
        if doc.deleted {
            return Err(Error::database(format!(
                "Document {} is already deleted",
                id
            )));
        }

        let now = Utc::now();

        tx.execute(
            r#"
            INSERT INTO deletion_log (
                document_id, name, deleted_by, reason, metadata,
                content_kind, file_size, deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                doc.id.to_string(),
                doc.name,
                actor,
                reason,
                serde_json::to_string(&doc.content_meta)?,
                doc.content_kind.as_str(),
                doc.content.len() as i64,
                now.to_rfc3339(),
            ],
        )?;

        tx.execute(
            r#"
            UPDATE documents SET
                deleted = 1,
                deleted_at = ?2,
                deleted_by = ?3,
                content_meta = '{}'
            WHERE id = ?1
            "#,
            params![id.to_string(), now.to_rfc3339(), actor],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Clear the deletion flag and rehydrate metadata from the most recent
    /// deletion log entry
    pub fn restore(&self, id: &Uuid) -> Result<Document> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let doc = query_document(&tx, "WHERE id = ?1", params![id.to_string()])?
            .ok_or_else(|| Error::DocumentNotFound(id.to_string()))?;
        if !doc.deleted {
            return Err(Error::database(format!("Document {} is not deleted", id)));
        }

        let metadata_json: Option<String> = tx
            .query_row(
                "SELECT metadata FROM deletion_log WHERE document_id = ?1
                 ORDER BY id DESC LIMIT 1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        let rehydrated = metadata_json.unwrap_or_else(|| "{}".to_string());

        tx.execute(
            r#"
            UPDATE documents SET
                deleted = 0,
                deleted_at = NULL,
                deleted_by = NULL,
                content_meta = ?2
            WHERE id = ?1
            "#,
            params![id.to_string(), rehydrated],
        )?;

        tx.commit()?;
        drop(conn);

        self.get_document(id)?
            .ok_or_else(|| Error::DocumentNotFound(id.to_string()))
    }

    /// List an owner's documents, excluding soft-deleted ones
    pub fn list_active(&self, owner_id: &str) -> Result<Vec<Document>> {
        let conn = self.conn.lock();
        query_documents(
            &conn,
            "WHERE owner_id = ?1 AND deleted = 0 ORDER BY updated_at DESC",
            params![owner_id],
        )
    }

    /// List an owner's soft-deleted documents
    pub fn list_deleted(&self, owner_id: &str) -> Result<Vec<Document>> {
        let conn = self.conn.lock();
        query_documents(
            &conn,
            "WHERE owner_id = ?1 AND deleted = 1 ORDER BY deleted_at DESC",
            params![owner_id],
        )
    }

    /// Retention sweep: permanently remove documents soft-deleted more than
    /// `grace_days` ago, along with their version snapshots
    ///
    /// The deletion log is append-only and survives the sweep.
    pub fn hard_delete_older_than(&self, grace_days: i64) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let cutoff = (Utc::now() - chrono::Duration::days(grace_days)).to_rfc3339();

        let ids: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT id FROM documents WHERE deleted = 1 AND deleted_at < ?1",
            )?;
            let rows = stmt.query_map(params![cutoff], |row| row.get::<_, String>(0))?;
            rows.filter_map(|r| r.ok()).collect()
        };

        for id in &ids {
            tx.execute(
                "DELETE FROM document_versions WHERE document_id = ?1",
                params![id],
            )?;
            tx.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
        }

        tx.commit()?;

        if !ids.is_empty() {
            tracing::info!(
                "Retention sweep removed {} documents past the {}-day grace period",
                ids.len(),
                grace_days
            );
        }
        Ok(ids.len())
    }

    /// Version snapshots for a document, newest first
    pub fn snapshots_for(&self, document_id: &Uuid) -> Result<Vec<VersionSnapshot>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            r#"
            SELECT document_id, version, embedding, content_snapshot,
                   metadata, created_by, created_at
            FROM document_versions WHERE document_id = ?1 ORDER BY version DESC
            "#,
        )?;

        let snapshots = stmt
            .query_map(params![document_id.to_string()], |row| {
                let doc_id: String = row.get(0)?;
                let embedding: Option<Vec<u8>> = row.get(2)?;
                let metadata: Option<String> = row.get(4)?;
                let created_at: String = row.get(6)?;

                Ok(VersionSnapshot {
                    document_id: parse_uuid(&doc_id),
                    version: row.get(1)?,
                    embedding: embedding.as_deref().map(blob_to_vec),
                    content_snapshot: row.get(3)?,
                    metadata: parse_meta(metadata.as_deref()),
                    created_by: row.get(5)?,
                    created_at: parse_time(&created_at),
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(snapshots)
    }

    /// Deletion log entries for a document, newest first
    pub fn deletion_log_for(&self, document_id: &Uuid) -> Result<Vec<DeletionLogEntry>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            r#"
            SELECT document_id, name, deleted_by, reason, metadata,
                   content_kind, file_size, deleted_at
            FROM deletion_log WHERE document_id = ?1 ORDER BY id DESC
            "#,
        )?;

        let entries = stmt
            .query_map(params![document_id.to_string()], |row| {
                let doc_id: String = row.get(0)?;
                let metadata: Option<String> = row.get(4)?;
                let kind: String = row.get(5)?;
                let file_size: i64 = row.get(6)?;
                let deleted_at: String = row.get(7)?;

                Ok(DeletionLogEntry {
                    document_id: parse_uuid(&doc_id),
                    name: row.get(1)?,
                    deleted_by: row.get(2)?,
                    reason: row.get(3)?,
                    metadata: parse_meta(metadata.as_deref()),
                    content_kind: kind.parse().unwrap_or(ContentKind::FreeText),
                    file_size: file_size as u64,
                    deleted_at: parse_time(&deleted_at),
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(entries)
    }

    // ==================== Job Operations ====================

    /// Create a job row; jobs are never deleted
    pub fn create_job(&self, job: &IngestJob) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            r#"
            INSERT INTO jobs (
                id, user_id, session_id, filename, content_kind, file_size,
                storage_path, status, error_code, error_message, embedding_id,
                needs_embedding, attempts, metadata, queued_at, started_at,
                finished_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
            params![
                job.id.to_string(),
                job.user_id,
                job.session_id,
                job.filename,
                job.content_kind.as_str(),
                job.file_size_bytes as i64,
                job.storage_path,
                job.status.as_str(),
                job.error_code.map(|c| c.as_str()),
                job.error_message,
                job.embedding_id.map(|id| id.to_string()),
                job.needs_embedding as i64,
                job.attempts as i64,
                serde_json::to_string(&job.metadata)?,
                job.queued_at.to_rfc3339(),
                job.started_at.map(|t| t.to_rfc3339()),
                job.finished_at.map(|t| t.to_rfc3339()),
            ],
        )?;

        Ok(())
    }

    /// Persist the full mutable state of a job
    pub fn update_job(&self, job: &IngestJob) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            r#"
            UPDATE jobs SET
                status = ?2,
                error_code = ?3,
                error_message = ?4,
                embedding_id = ?5,
                needs_embedding = ?6,
                attempts = ?7,
                metadata = ?8,
                started_at = ?9,
                finished_at = ?10
            WHERE id = ?1
            "#,
            params![
                job.id.to_string(),
                job.status.as_str(),
                job.error_code.map(|c| c.as_str()),
                job.error_message,
                job.embedding_id.map(|id| id.to_string()),
                job.needs_embedding as i64,
                job.attempts as i64,
                serde_json::to_string(&job.metadata)?,
                job.started_at.map(|t| t.to_rfc3339()),
                job.finished_at.map(|t| t.to_rfc3339()),
            ],
        )?;

        Ok(())
    }

    /// Get a job by ID
    pub fn get_job(&self, id: &Uuid) -> Result<Option<IngestJob>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(&format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS))?;
        let job = stmt
            .query_row(params![id.to_string()], row_to_job)
            .optional()?;
        Ok(job)
    }

    /// Jobs submitted within a session, newest first
    pub fn jobs_for_session(&self, session_id: &str) -> Result<Vec<IngestJob>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM jobs WHERE session_id = ?1 ORDER BY queued_at DESC",
            JOB_COLUMNS
        ))?;
        let jobs = stmt
            .query_map(params![session_id], row_to_job)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(jobs)
    }

    /// Store statistics for operators
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock();

        let count = |sql: &str| -> Result<usize> {
            let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };

        Ok(StoreStats {
            active_documents: count("SELECT COUNT(*) FROM documents WHERE deleted = 0")?,
            deleted_documents: count("SELECT COUNT(*) FROM documents WHERE deleted = 1")?,
            snapshots: count("SELECT COUNT(*) FROM document_versions")?,
            jobs: count("SELECT COUNT(*) FROM jobs")?,
        })
    }
}

// ==================== Row Mapping ====================

const DOCUMENT_COLUMNS: &str = "id, owner_id, name, storage_path, content_kind, tags, \
     original_content, content, content_meta, embedding, previous_embedding, \
     version, embedding_changed, deleted, deleted_at, deleted_by, created_at, updated_at";

const JOB_COLUMNS: &str = "id, user_id, session_id, filename, content_kind, file_size, \
     storage_path, status, error_code, error_message, embedding_id, \
     needs_embedding, attempts, metadata, queued_at, started_at, finished_at";

fn query_document(
    conn: &Connection,
    filter: &str,
    params: impl rusqlite::Params,
) -> Result<Option<Document>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM documents {}",
        DOCUMENT_COLUMNS, filter
    ))?;
    Ok(stmt.query_row(params, row_to_document).optional()?)
}

fn query_documents(
    conn: &Connection,
    filter: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Document>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM documents {}",
        DOCUMENT_COLUMNS, filter
    ))?;
    let docs = stmt
        .query_map(params, row_to_document)?
        .filter_map(|r| r.ok())
        .collect();
    Ok(docs)
}

fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
    let id: String = row.get(0)?;
    let kind: String = row.get(4)?;
    let tags: String = row.get(5)?;
    let content_meta: Option<String> = row.get(8)?;
    let embedding: Option<Vec<u8>> = row.get(9)?;
    let previous_embedding: Option<Vec<u8>> = row.get(10)?;
    let deleted_at: Option<String> = row.get(14)?;
    let created_at: String = row.get(16)?;
    let updated_at: String = row.get(17)?;

    Ok(Document {
        id: parse_uuid(&id),
        owner_id: row.get(1)?,
        name: row.get(2)?,
        storage_path: row.get(3)?,
        content_kind: kind.parse().unwrap_or(ContentKind::FreeText),
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        original_content: row.get(6)?,
        content: row.get(7)?,
        content_meta: parse_meta(content_meta.as_deref()),
        embedding: embedding.as_deref().map(blob_to_vec),
        previous_embedding: previous_embedding.as_deref().map(blob_to_vec),
        version: row.get(11)?,
        embedding_changed: row.get::<_, i64>(12)? != 0,
        deleted: row.get::<_, i64>(13)? != 0,
        deleted_at: deleted_at.as_deref().map(parse_time),
        deleted_by: row.get(15)?,
        created_at: parse_time(&created_at),
        updated_at: parse_time(&updated_at),
    })
}

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<IngestJob> {
    let id: String = row.get(0)?;
    let kind: String = row.get(4)?;
    let file_size: i64 = row.get(5)?;
    let status: String = row.get(7)?;
    let error_code: Option<String> = row.get(8)?;
    let embedding_id: Option<String> = row.get(10)?;
    let metadata: Option<String> = row.get(13)?;
    let queued_at: String = row.get(14)?;
    let started_at: Option<String> = row.get(15)?;
    let finished_at: Option<String> = row.get(16)?;

    Ok(IngestJob {
        id: parse_uuid(&id),
        user_id: row.get(1)?,
        session_id: row.get(2)?,
        filename: row.get(3)?,
        content_kind: kind.parse().unwrap_or(ContentKind::FreeText),
        file_size_bytes: file_size as u64,
        storage_path: row.get(6)?,
        status: parse_status(&status),
        error_code: error_code.as_deref().map(parse_error_code),
        error_message: row.get(9)?,
        embedding_id: embedding_id.as_deref().map(|s| parse_uuid(s)),
        needs_embedding: row.get::<_, i64>(11)? != 0,
        attempts: row.get::<_, i64>(12)? as u32,
        metadata: metadata
            .as_deref()
            .and_then(|m| serde_json::from_str::<JobMetadata>(m).ok())
            .unwrap_or_default(),
        queued_at: parse_time(&queued_at),
        started_at: started_at.as_deref().map(parse_time),
        finished_at: finished_at.as_deref().map(parse_time),
    })
}

fn parse_status(s: &str) -> JobStatus {
    match s {
        "queued" => JobStatus::Queued,
        "processing" => JobStatus::Processing,
        "ready" => JobStatus::Ready,
        _ => JobStatus::Failed,
    }
}

fn parse_error_code(s: &str) -> JobErrorCode {
    match s {
        "payload_missing" => JobErrorCode::PayloadMissing,
        "validation_error" => JobErrorCode::ValidationError,
        "pipeline_error" => JobErrorCode::PipelineError,
        _ => JobErrorCode::IngestException,
    }
}

fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_time(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_meta(s: Option<&str>) -> HashMap<String, serde_json::Value> {
    s.and_then(|m| serde_json::from_str(m).ok()).unwrap_or_default()
}

/// Encode a float vector as little-endian f32 bytes for BLOB storage
fn vec_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

/// Decode a BLOB back into a float vector
fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Truncate to a byte limit without splitting a UTF-8 character
fn truncate_to_boundary(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
