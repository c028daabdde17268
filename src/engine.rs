//! Explicit one-time startup wiring and the public engine handle
//!
//! Everything process-wide (the document store with its idempotent
//! migrations, the blob store, the embedding cache and worker pools, the
//! notifier) is constructed exactly once here and passed by handle. There
//! is no lazy module-level initialization.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::IngestConfig;
use crate::embedding::{Debounce, EmbeddingClient};
use crate::error::{Error, Result};
use crate::ingestion::Normalizer;
use crate::notify::Notifier;
use crate::processing::{IngestWorker, JobQueue, PipelineContext, QueueStats};
use crate::providers::{BlobStore, LanguageProvider, LocalBlobStore};
use crate::storage::{DocumentDb, StoreStats};
use crate::types::{Document, IngestJob, JobNotification, JobStatus};

/// One upload submission
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub user_id: String,
    pub session_id: String,
    pub filename: String,
    /// Declared content type, e.g. "plain_text" or "delimited_table"
    pub declared_type: String,
    pub data: Vec<u8>,
    /// Opaque client-side signature, echoed back in notifications
    pub client_signature: Option<String>,
}

/// Handle to a running ingestion pipeline
#[derive(Clone)]
pub struct IngestEngine {
    config: IngestConfig,
    db: Arc<DocumentDb>,
    blobs: Arc<dyn BlobStore>,
    queue: Arc<JobQueue>,
    notifier: Arc<Notifier>,
}

impl IngestEngine {
    /// Construct every component and start the worker pools; returns a
    /// ready handle
    pub fn start(config: IngestConfig, provider: Arc<dyn LanguageProvider>) -> Result<Self> {
        let db = Arc::new(DocumentDb::open(
            &config.storage.database_path,
            config.storage.snapshot_max_bytes,
        )?);
        let blobs: Arc<dyn BlobStore> =
            Arc::new(LocalBlobStore::new(config.storage.blob_dir.clone())?);
        Self::start_with_stores(config, provider, db, blobs)
    }

    /// Start against caller-provided stores (used by tests and embedders)
    pub fn start_with_stores(
        config: IngestConfig,
        provider: Arc<dyn LanguageProvider>,
        db: Arc<DocumentDb>,
        blobs: Arc<dyn BlobStore>,
    ) -> Result<Self> {
        tracing::info!("Starting ingestion engine (provider: {})", provider.name());

        let embeddings = EmbeddingClient::start(&config.embedding, Arc::clone(&provider));
        let notifier = Arc::new(Notifier::new());
        let debounce = Arc::new(Debounce::new(Duration::from_secs(
            config.processing.debounce_secs,
        )));

        let worker_count = config
            .processing
            .workers
            .unwrap_or_else(|| num_cpus::get().min(4))
            .max(1);
        let (queue, receiver) = JobQueue::new(worker_count, Arc::clone(&db));
        let queue = Arc::new(queue);

        let ctx = Arc::new(PipelineContext {
            config: config.clone(),
            db: Arc::clone(&db),
            blobs: Arc::clone(&blobs),
            embeddings,
            provider,
            notifier: Arc::clone(&notifier),
            queue: Arc::clone(&queue),
            debounce,
        });
        IngestWorker::spawn_pool(ctx, receiver);

        tracing::info!("Ingestion engine ready");
        Ok(Self {
            config,
            db,
            blobs,
            queue,
            notifier,
        })
    }

    /// Store the payload and enqueue an ingestion job for it
    pub async fn submit(&self, request: SubmitRequest) -> Result<IngestJob> {
        let kind = Normalizer::resolve_kind(&request.declared_type)?;

        let mut job = IngestJob::new(
            request.user_id,
            request.session_id,
            request.filename,
            kind,
            request.data.len() as u64,
            String::new(),
        );
        job.metadata.client_signature = request.client_signature;

        // Each submission gets its own payload path so a failed job's bytes
        // stay recoverable for resubmission
        let path = format!("uploads/{}/{}/{}", job.user_id, job.id, job.filename);
        job.storage_path = self.blobs.write(&path, &request.data).await?;

        let job_id = self.queue.submit(job).await?;
        self.queue
            .get(&job_id)
            .ok_or_else(|| Error::JobNotFound(job_id))
    }

    /// Create a new job referencing a failed job's stored payload
    ///
    /// The engine never auto-retries; resubmission is an explicit caller
    /// decision.
    pub async fn resubmit(&self, job_id: &Uuid) -> Result<IngestJob> {
        let previous = self
            .queue
            .get(job_id)
            .ok_or(Error::JobNotFound(*job_id))?;

        if previous.status != JobStatus::Failed {
            return Err(Error::internal(format!(
                "Job {} is {}, only failed jobs can be resubmitted",
                job_id,
                previous.status.as_str()
            )));
        }

        let mut job = IngestJob::new(
            previous.user_id.clone(),
            previous.session_id.clone(),
            previous.filename.clone(),
            previous.content_kind,
            previous.file_size_bytes,
            previous.storage_path.clone(),
        );
        job.metadata.client_signature = previous.metadata.client_signature.clone();

        let new_id = self.queue.submit(job).await?;
        self.queue
            .get(&new_id)
            .ok_or_else(|| Error::JobNotFound(new_id))
    }

    /// Latest state of a job
    pub fn job(&self, job_id: &Uuid) -> Option<IngestJob> {
        self.queue.get(job_id)
    }

    /// Jobs submitted within a session, newest first
    pub fn jobs_for_session(&self, session_id: &str) -> Result<Vec<IngestJob>> {
        self.db.jobs_for_session(session_id)
    }

    /// Subscribe to a session's progress notifications
    pub fn subscribe(&self, session_id: &str) -> broadcast::Receiver<JobNotification> {
        self.notifier.subscribe(session_id)
    }

    /// Current document under an identity key
    pub fn document(&self, owner_id: &str, name: &str) -> Result<Option<Document>> {
        self.db.get_by_owner_and_name(owner_id, name)
    }

    /// An owner's documents, excluding soft-deleted ones
    pub fn list_documents(&self, owner_id: &str) -> Result<Vec<Document>> {
        self.db.list_active(owner_id)
    }

    /// An owner's soft-deleted documents
    pub fn list_deleted(&self, owner_id: &str) -> Result<Vec<Document>> {
        self.db.list_deleted(owner_id)
    }

    /// Soft-delete a document; reversible via [`IngestEngine::restore`]
    pub fn soft_delete(&self, id: &Uuid, actor: &str, reason: Option<&str>) -> Result<()> {
        self.db.soft_delete(id, actor, reason)
    }

    /// Restore a soft-deleted document
    pub fn restore(&self, id: &Uuid) -> Result<Document> {
        self.db.restore(id)
    }

    /// Operator-invoked retention sweep over soft-deleted documents
    pub fn retention_sweep(&self) -> Result<usize> {
        self.db
            .hard_delete_older_than(self.config.retention.grace_days)
    }

    /// Queue statistics
    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Store statistics
    pub fn store_stats(&self) -> Result<StoreStats> {
        self.db.stats()
    }

    /// Direct store access for advanced callers
    pub fn db(&self) -> &Arc<DocumentDb> {
        &self.db
    }
}

/// Initialize tracing from `RUST_LOG`, for binaries embedding the engine
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
