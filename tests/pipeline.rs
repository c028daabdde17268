//! End-to-end pipeline scenarios against a scripted provider

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use docpipe::config::IngestConfig;
use docpipe::embedding::{fallback_embedding, Debounce, EmbeddingClient};
use docpipe::engine::{IngestEngine, SubmitRequest};
use docpipe::notify::Notifier;
use docpipe::processing::{IngestWorker, JobQueue, PipelineContext};
use docpipe::providers::{LanguageProvider, LocalBlobStore, ProviderError, ProviderResult};
use docpipe::storage::DocumentDb;
use docpipe::types::{ContentKind, IngestJob, JobErrorCode, JobStatus, ProgressStage};

/// Provider stub: deterministic embeddings, no translation or summaries
struct TestProvider {
    embeddings_available: bool,
}

#[async_trait]
impl LanguageProvider for TestProvider {
    async fn detect_language(&self, _text: &str) -> ProviderResult<String> {
        Ok("en".to_string())
    }

    async fn translate(&self, _t: &str, _s: &str, _d: &str) -> ProviderResult<String> {
        Err(ProviderError::Empty)
    }

    async fn summarize_chunk(&self, _text: &str) -> ProviderResult<Vec<String>> {
        Err(ProviderError::Empty)
    }

    async fn reduce_summaries(&self, _summaries: &[String]) -> ProviderResult<String> {
        Err(ProviderError::Empty)
    }

    async fn embed_many(&self, texts: &[String]) -> ProviderResult<Vec<Vec<f32>>> {
        if !self.embeddings_available {
            return Err(ProviderError::Unavailable("offline".into()));
        }
        // Deterministic per text: identical content embeds identically,
        // different content lands nearly orthogonal
        Ok(texts.iter().map(|t| fallback_embedding(t, 64)).collect())
    }

    fn name(&self) -> &str {
        "test"
    }
}

fn test_config(blob_dir: &std::path::Path, allow_fallback: bool) -> IngestConfig {
    let mut config = IngestConfig::default();
    config.storage.blob_dir = blob_dir.to_path_buf();
    config.embedding.dimensions = 64;
    config.embedding.workers = Some(2);
    config.embedding.allow_fallback = allow_fallback;
    config.processing.workers = Some(2);
    config
}

fn start_engine(provider: Arc<dyn LanguageProvider>, allow_fallback: bool) -> (IngestEngine, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir.path().join("blobs"), allow_fallback);
    let db = Arc::new(DocumentDb::in_memory().unwrap());
    let blobs = Arc::new(LocalBlobStore::new(dir.path().join("blobs")).unwrap());
    let engine = IngestEngine::start_with_stores(config, provider, db, blobs).unwrap();
    (engine, dir)
}

fn submit_request(filename: &str, data: &[u8]) -> SubmitRequest {
    SubmitRequest {
        user_id: "u1".to_string(),
        session_id: "s1".to_string(),
        filename: filename.to_string(),
        declared_type: "plain_text".to_string(),
        data: data.to_vec(),
        client_signature: None,
    }
}

async fn wait_for_terminal(engine: &IngestEngine, job_id: Uuid) -> IngestJob {
    for _ in 0..500 {
        if let Some(job) = engine.job(&job_id) {
            if job.status.is_terminal() {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} did not reach a terminal state", job_id);
}

#[tokio::test]
async fn first_upload_inserts_version_one() {
    let (engine, _dir) = start_engine(Arc::new(TestProvider { embeddings_available: true }), true);

    let job = engine
        .submit(submit_request("doc.txt", b"Hello world"))
        .await
        .unwrap();
    let done = wait_for_terminal(&engine, job.id).await;

    assert_eq!(done.status, JobStatus::Ready);
    assert_eq!(done.attempts, 1);
    assert!(!done.needs_embedding);
    assert!(done.embedding_id.is_some());
    assert_eq!(done.metadata.reprocessed, Some(true));
    assert!(done.metadata.file_hash.is_some());

    let doc = engine.document("u1", "doc.txt").unwrap().unwrap();
    assert_eq!(doc.version, 1);
    assert!(doc.embedding.is_some());
    assert_eq!(doc.content, "Hello world");
}

#[tokio::test]
async fn unchanged_reupload_is_deduplicated() {
    let (engine, _dir) = start_engine(Arc::new(TestProvider { embeddings_available: true }), true);

    let first = engine
        .submit(submit_request("doc.txt", b"Hello world"))
        .await
        .unwrap();
    let first = wait_for_terminal(&engine, first.id).await;
    assert_eq!(first.metadata.reprocessed, Some(true));
    let doc_v1 = engine.document("u1", "doc.txt").unwrap().unwrap();

    let second = engine
        .submit(submit_request("doc.txt", b"Hello world"))
        .await
        .unwrap();
    let second = wait_for_terminal(&engine, second.id).await;

    assert_eq!(second.status, JobStatus::Ready);
    assert_eq!(second.metadata.reprocessed, Some(false));
    assert!(second.metadata.similarity_score.unwrap() > 0.95);
    assert_eq!(second.metadata.document_id, Some(doc_v1.id));

    // Same id, version unchanged, no snapshot written
    let doc = engine.document("u1", "doc.txt").unwrap().unwrap();
    assert_eq!(doc.id, doc_v1.id);
    assert_eq!(doc.version, 1);
    assert!(engine.db().snapshots_for(&doc.id).unwrap().is_empty());
}

#[tokio::test]
async fn changed_reupload_creates_new_version_with_snapshot() {
    let (engine, _dir) = start_engine(Arc::new(TestProvider { embeddings_available: true }), true);

    let first = engine
        .submit(submit_request("doc.txt", b"Original content for testing"))
        .await
        .unwrap();
    wait_for_terminal(&engine, first.id).await;
    let doc_v1 = engine.document("u1", "doc.txt").unwrap().unwrap();
    assert_eq!(doc_v1.version, 1);

    let second = engine
        .submit(submit_request("doc.txt", b"Completely different content here"))
        .await
        .unwrap();
    let second = wait_for_terminal(&engine, second.id).await;

    assert_eq!(second.status, JobStatus::Ready);
    assert_eq!(second.metadata.reprocessed, Some(true));
    assert!(second.metadata.similarity_score.unwrap() < 0.95);

    let doc_v2 = engine.document("u1", "doc.txt").unwrap().unwrap();
    assert_eq!(doc_v2.id, doc_v1.id);
    assert_eq!(doc_v2.version, 2);
    assert_eq!(doc_v2.content, "Completely different content here");
    assert_eq!(doc_v2.previous_embedding, doc_v1.embedding);

    let snapshots = engine.db().snapshots_for(&doc_v1.id).unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].version, 1);
    assert_eq!(snapshots[0].content_snapshot, "Original content for testing");
}

#[tokio::test]
async fn missing_payload_fails_with_taxonomy_code() {
    // Wire the engine internals directly so a job can reference a storage
    // path that holds no bytes
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir.path().join("blobs"), true);
    let provider: Arc<dyn LanguageProvider> =
        Arc::new(TestProvider { embeddings_available: true });

    let db = Arc::new(DocumentDb::in_memory().unwrap());
    let blobs = Arc::new(LocalBlobStore::new(dir.path().join("blobs")).unwrap());
    let (queue, receiver) = JobQueue::new(1, Arc::clone(&db));
    let queue = Arc::new(queue);
    let embeddings = EmbeddingClient::start(&config.embedding, Arc::clone(&provider));

    let ctx = Arc::new(PipelineContext {
        config,
        db,
        blobs,
        embeddings,
        provider,
        notifier: Arc::new(Notifier::new()),
        queue: Arc::clone(&queue),
        debounce: Arc::new(Debounce::new(Duration::from_secs(30))),
    });
    IngestWorker::spawn_pool(ctx, receiver);

    let job = IngestJob::new(
        "u1".into(),
        "s1".into(),
        "ghost.txt".into(),
        ContentKind::PlainText,
        0,
        "uploads/u1/nonexistent/ghost.txt".into(),
    );
    let job_id = queue.submit(job).await.unwrap();

    let done = loop {
        if let Some(job) = queue.get(&job_id) {
            if job.status.is_terminal() {
                break job;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };

    assert_eq!(done.status, JobStatus::Failed);
    assert_eq!(done.error_code, Some(JobErrorCode::PayloadMissing));
    assert!(done.finished_at.is_some());
}

#[tokio::test]
async fn empty_upload_fails_validation() {
    let (engine, _dir) = start_engine(Arc::new(TestProvider { embeddings_available: true }), true);

    let job = engine.submit(submit_request("empty.txt", b"")).await.unwrap();
    let done = wait_for_terminal(&engine, job.id).await;

    assert_eq!(done.status, JobStatus::Failed);
    assert_eq!(done.error_code, Some(JobErrorCode::ValidationError));
    assert!(done.finished_at.is_some());
}

#[tokio::test]
async fn unknown_declared_type_is_rejected_at_submission() {
    let (engine, _dir) = start_engine(Arc::new(TestProvider { embeddings_available: true }), true);

    let mut request = submit_request("doc.bin", b"data");
    request.declared_type = "carrier_pigeon".to_string();
    assert!(engine.submit(request).await.is_err());
}

#[tokio::test]
async fn provider_outage_degrades_to_local_fallback() {
    let (engine, _dir) = start_engine(Arc::new(TestProvider { embeddings_available: false }), true);

    let job = engine
        .submit(submit_request("doc.txt", b"Hello world"))
        .await
        .unwrap();
    let done = wait_for_terminal(&engine, job.id).await;

    // The fallback embedder kept the job fully successful
    assert_eq!(done.status, JobStatus::Ready);
    assert!(!done.needs_embedding);
    let doc = engine.document("u1", "doc.txt").unwrap().unwrap();
    assert!(doc.embedding.is_some());
}

#[tokio::test]
async fn embedding_outage_defers_backfill_instead_of_failing() {
    // Fallback disabled: no embedding can be obtained at all
    let (engine, _dir) = start_engine(Arc::new(TestProvider { embeddings_available: false }), false);

    let job = engine
        .submit(submit_request("doc.txt", b"Hello world"))
        .await
        .unwrap();
    let done = wait_for_terminal(&engine, job.id).await;

    // Content was still normalized and stored; the job signals deferral
    assert_eq!(done.status, JobStatus::Ready);
    assert!(done.needs_embedding);
    assert!(done.embedding_id.is_none());

    let doc = engine.document("u1", "doc.txt").unwrap().unwrap();
    assert_eq!(doc.version, 1);
    assert!(doc.embedding.is_none());
    assert_eq!(doc.content, "Hello world");
}

#[tokio::test]
async fn progress_notifications_reach_subscribers() {
    let (engine, _dir) = start_engine(Arc::new(TestProvider { embeddings_available: true }), true);

    let mut receiver = engine.subscribe("s1");
    let job = engine
        .submit(submit_request("doc.txt", b"Hello world. Another sentence here."))
        .await
        .unwrap();
    wait_for_terminal(&engine, job.id).await;
    // The terminal notification is emitted just after the status flips;
    // give it a moment to land before draining
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut stages = Vec::new();
    while let Ok(notification) = receiver.try_recv() {
        assert_eq!(notification.session_id, "s1");
        assert_eq!(notification.id, job.id);
        if let Some(stage) = notification.progress_stage {
            stages.push(stage);
        }
    }

    assert!(stages.contains(&ProgressStage::Parsed));
    assert!(stages.contains(&ProgressStage::Chunked));
    assert_eq!(stages.last(), Some(&ProgressStage::Ready));
}

#[tokio::test]
async fn soft_delete_and_restore_via_engine() {
    let (engine, _dir) = start_engine(Arc::new(TestProvider { embeddings_available: true }), true);

    let job = engine
        .submit(submit_request("doc.txt", b"Hello world"))
        .await
        .unwrap();
    wait_for_terminal(&engine, job.id).await;
    let doc = engine.document("u1", "doc.txt").unwrap().unwrap();

    engine.soft_delete(&doc.id, "u1", Some("cleanup")).unwrap();
    assert!(engine.list_documents("u1").unwrap().is_empty());
    assert_eq!(engine.list_deleted("u1").unwrap().len(), 1);

    let restored = engine.restore(&doc.id).unwrap();
    assert_eq!(restored.content, "Hello world");
    assert_eq!(engine.list_documents("u1").unwrap().len(), 1);
    assert!(engine.list_deleted("u1").unwrap().is_empty());
}

#[tokio::test]
async fn failed_job_can_be_resubmitted() {
    let (engine, _dir) = start_engine(Arc::new(TestProvider { embeddings_available: true }), true);

    let job = engine.submit(submit_request("empty.txt", b"")).await.unwrap();
    let failed = wait_for_terminal(&engine, job.id).await;
    assert_eq!(failed.status, JobStatus::Failed);

    let retried = engine.resubmit(&failed.id).await.unwrap();
    assert_ne!(retried.id, failed.id);
    assert_eq!(retried.storage_path, failed.storage_path);

    let done = wait_for_terminal(&engine, retried.id).await;
    assert_eq!(done.status, JobStatus::Failed);
    assert_eq!(done.error_code, Some(JobErrorCode::ValidationError));

    // Only failed jobs are eligible
    let ok_job = engine
        .submit(submit_request("doc.txt", b"Hello world"))
        .await
        .unwrap();
    let ok_job = wait_for_terminal(&engine, ok_job.id).await;
    assert!(engine.resubmit(&ok_job.id).await.is_err());
}

#[tokio::test]
async fn session_job_listing_tracks_submissions() {
    let (engine, _dir) = start_engine(Arc::new(TestProvider { embeddings_available: true }), true);

    let a = engine.submit(submit_request("a.txt", b"First document")).await.unwrap();
    let b = engine.submit(submit_request("b.txt", b"Second document")).await.unwrap();
    wait_for_terminal(&engine, a.id).await;
    wait_for_terminal(&engine, b.id).await;

    let jobs = engine.jobs_for_session("s1").unwrap();
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|j| j.status == JobStatus::Ready));

    let stats = engine.queue_stats();
    assert_eq!(stats.ready, 2);
    assert_eq!(stats.in_flight, 0);
}

#[tokio::test]
async fn delimited_upload_keeps_tabular_analytics() {
    let (engine, _dir) = start_engine(Arc::new(TestProvider { embeddings_available: true }), true);

    let mut request = submit_request("people.csv", b"name,age\nalice,30\nbob,25\n");
    request.declared_type = "delimited_table".to_string();
    let job = engine.submit(request).await.unwrap();
    let done = wait_for_terminal(&engine, job.id).await;

    assert_eq!(done.status, JobStatus::Ready);
    let analytics = done.metadata.analytics.unwrap();
    assert_eq!(analytics["row_count"], serde_json::json!(2));
    assert_eq!(analytics["column_count"], serde_json::json!(2));

    let doc = engine.document("u1", "people.csv").unwrap().unwrap();
    assert_eq!(doc.content_kind, ContentKind::DelimitedTable);
    assert!(doc.content.contains("alice | 30"));
}
