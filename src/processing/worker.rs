//! Background workers executing the ingestion pipeline
//!
//! Each worker drains job ids from the shared queue and runs one job at a
//! time through normalize → language → chunk → embed → version decision →
//! store. Every failure is caught at the top of the job and converted to the
//! error taxonomy; nothing escapes to kill a worker or affect other jobs.

use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::IngestConfig;
use crate::embedding::{mean_embedding, Debounce, EmbeddingClient};
use crate::error::{Error, Result};
use crate::ingestion::{Chunker, LanguageStage, Normalizer};
use crate::notify::Notifier;
use crate::providers::{BlobStore, LanguageProvider};
use crate::storage::{DocumentDb, DocumentWrite};
use crate::types::{Chunk, Document, IngestJob, JobErrorCode, JobStatus, ProgressStage};
use crate::versioning::{VersionManager, WriteAction};

use super::job_queue::JobQueue;

/// Shared dependencies for pipeline execution, constructed once at startup
/// and passed into every job
pub struct PipelineContext {
    pub config: IngestConfig,
    pub db: Arc<DocumentDb>,
    pub blobs: Arc<dyn BlobStore>,
    pub embeddings: EmbeddingClient,
    pub provider: Arc<dyn LanguageProvider>,
    pub notifier: Arc<Notifier>,
    pub queue: Arc<JobQueue>,
    pub debounce: Arc<Debounce>,
}

/// Result of one successful pipeline run
struct PipelineOutcome {
    document: Document,
    similarity: Option<f32>,
    reprocessed: bool,
    /// Whether an embedding vector was actually obtained
    embedded: bool,
}

/// Worker pool executing ingestion jobs
pub struct IngestWorker;

impl IngestWorker {
    /// Spawn the worker pool over the queue's receiver
    pub fn spawn_pool(ctx: Arc<PipelineContext>, receiver: mpsc::Receiver<Uuid>) {
        let workers = ctx
            .config
            .processing
            .workers
            .unwrap_or_else(|| num_cpus::get().min(4))
            .max(1);

        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        for worker_id in 0..workers {
            let ctx = Arc::clone(&ctx);
            let receiver = Arc::clone(&receiver);
            tokio::spawn(async move {
                tracing::info!("Ingest worker {} started", worker_id);
                loop {
                    let job_id = { receiver.lock().await.recv().await };
                    let Some(job_id) = job_id else {
                        break;
                    };
                    Self::dispatch(&ctx, job_id).await;
                }
                tracing::info!("Ingest worker {} stopped", worker_id);
            });
        }

        tracing::info!("Worker pool started with {} workers", workers);
    }

    /// Dispatch one job: move it to processing, run the pipeline, settle the
    /// terminal state
    async fn dispatch(ctx: &Arc<PipelineContext>, job_id: Uuid) {
        let Some(job) = ctx.queue.update(job_id, |j| {
            j.attempts += 1;
            j.status = JobStatus::Processing;
            j.started_at = Some(chrono::Utc::now());
        }) else {
            tracing::error!("Dispatched unknown job {}", job_id);
            return;
        };
        ctx.notifier.emit(&job);

        // The pipeline runs in its own task so a panic surfaces as a join
        // error instead of taking the worker down
        let pipeline_ctx = Arc::clone(ctx);
        let pipeline_job = job.clone();
        let handle = tokio::spawn(async move { Self::process(pipeline_ctx, pipeline_job).await });

        let outcome = match handle.await {
            Ok(result) => result,
            Err(join_err) => Err(Error::internal(format!(
                "pipeline task aborted: {}",
                join_err
            ))),
        };

        match outcome {
            Ok(outcome) => {
                let updated = ctx.queue.update(job_id, |j| {
                    j.status = JobStatus::Ready;
                    j.finished_at = Some(chrono::Utc::now());
                    if outcome.embedded {
                        j.needs_embedding = false;
                        j.embedding_id = Some(outcome.document.id);
                    }
                    j.metadata.document_id = Some(outcome.document.id);
                    j.metadata.similarity_score = outcome.similarity;
                    j.metadata.reprocessed = Some(outcome.reprocessed);
                    j.metadata.progress_stage = Some(ProgressStage::Ready);
                    j.metadata.progress_detail =
                        Some(format!("version {}", outcome.document.version));
                });
                if let Some(updated) = updated {
                    ctx.notifier.emit(&updated);
                }
                tracing::info!(
                    "Job {} ready (document {}, version {})",
                    job_id,
                    outcome.document.id,
                    outcome.document.version
                );
            }
            Err(e) => {
                let code = classify_error(&e);
                let message = e.to_string();
                let updated = ctx.queue.update(job_id, |j| {
                    j.status = JobStatus::Failed;
                    j.error_code = Some(code);
                    j.error_message = Some(message.clone());
                    j.finished_at = Some(chrono::Utc::now());
                    j.metadata.progress_stage = Some(ProgressStage::Failed);
                    j.metadata.progress_detail = Some(code.as_str().to_string());
                });
                if let Some(updated) = updated {
                    ctx.notifier.emit(&updated);
                }
                tracing::error!("Job {} failed ({}): {}", job_id, code.as_str(), message);
            }
        }
    }

    /// Run the pipeline stages for one job
    async fn process(ctx: Arc<PipelineContext>, job: IngestJob) -> Result<PipelineOutcome> {
        let job_id = job.id;

        // Payload bytes
        let data = ctx.blobs.read(&job.storage_path).await?;

        // Normalize
        let normalizer = Normalizer::new(ctx.config.normalizer.max_input_bytes);
        let normalized = normalizer.normalize(&data, job.content_kind)?;
        Self::progress(
            &ctx,
            job_id,
            ProgressStage::Parsed,
            format!("{} chars", normalized.normalized_text.chars().count()),
        );

        // Language stage (never fails the job)
        let language = LanguageStage::new(
            Arc::clone(&ctx.provider),
            ctx.config.provider.canonical_language.clone(),
        );
        let lang_result = language.run(&normalized.normalized_text).await;
        let detected = lang_result.detected.clone();
        Self::progress(
            &ctx,
            job_id,
            ProgressStage::Translated,
            match (&detected, lang_result.translated) {
                (Some(lang), true) => format!("translated from {}", lang),
                (Some(lang), false) => format!("kept {}", lang),
                (None, _) => "language unknown".to_string(),
            },
        );
        let text = lang_result.text;

        // Chunk
        let chunker = Chunker::new(&ctx.config.chunking);
        let mut chunks = chunker.chunk(&text);
        Self::progress(
            &ctx,
            job_id,
            ProgressStage::Chunked,
            format!("{} chunks", chunks.len()),
        );

        // Embed; provider failure degrades through the client, and a fully
        // unavailable embedding defers the backfill instead of failing
        Self::progress(&ctx, job_id, ProgressStage::Embedding, String::new());
        let document_embedding = Self::embed_chunks(&ctx, &mut chunks).await?;

        // Enrichment (best-effort)
        let (summary, concepts) = Self::summarize(&ctx, &chunks, &text).await;
        let preview = preview_excerpt(&text);

        // Record stage outputs on the job before the store write
        ctx.queue.update(job_id, |j| {
            j.metadata.language = detected.clone();
            j.metadata.file_hash = Some(normalized.content_hash.clone());
            j.metadata.summary = summary.clone();
            j.metadata.concepts = concepts.clone();
            j.metadata.processed_preview = Some(preview.clone());
            j.metadata.analytics = Some(serde_json::json!(normalized.metadata.clone()));
        });

        // Version decision and store write
        let content_meta = build_content_meta(&normalized.metadata, &summary, &concepts);
        let write = DocumentWrite {
            storage_path: job.storage_path.clone(),
            content_kind: job.content_kind,
            tags: Vec::new(),
            original_content: normalized.original_text.clone(),
            content: text.clone(),
            content_meta,
            embedding: document_embedding.clone(),
        };

        let existing = ctx
            .db
            .get_by_owner_and_name(&job.user_id, &job.filename)?;
        let manager = VersionManager::default();
        let action = manager.decide(existing.as_ref(), document_embedding.as_deref());

        let outcome = match (action, existing) {
            (WriteAction::Insert, _) | (_, None) => {
                let mut doc = Document::new(
                    job.user_id.clone(),
                    job.filename.clone(),
                    job.content_kind,
                );
                doc.storage_path = write.storage_path.clone();
                doc.original_content = write.original_content.clone();
                doc.content = write.content.clone();
                doc.content_meta = write.content_meta.clone();
                doc.embedding = write.embedding.clone();
                doc.embedding_changed = write.embedding.is_some();
                ctx.db.insert_document(&doc)?;

                PipelineOutcome {
                    embedded: doc.embedding.is_some(),
                    document: doc,
                    similarity: None,
                    reprocessed: true,
                }
            }
            (WriteAction::Unchanged { similarity }, Some(doc)) => {
                // Best-effort refresh for unchanged content, debounced per
                // owner/session so repeated re-uploads stay cheap
                let debounce_key = format!("{}:{}", job.user_id, job.session_id);
                if ctx.debounce.should_run(&debounce_key) {
                    if let Some(embedding) = doc.embedding.clone() {
                        ctx.embeddings.prime(&doc.content, embedding);
                    }
                }

                PipelineOutcome {
                    embedded: doc.embedding.is_some(),
                    document: doc,
                    similarity: Some(similarity),
                    reprocessed: false,
                }
            }
            (WriteAction::NewVersion { similarity }, Some(doc)) => {
                let updated =
                    ctx.db
                        .overwrite_with_version(&doc.id, doc.version, &write, &job.user_id)?;

                PipelineOutcome {
                    embedded: updated.embedding.is_some(),
                    document: updated,
                    similarity,
                    reprocessed: true,
                }
            }
        };

        Self::progress(
            &ctx,
            job_id,
            ProgressStage::Stored,
            format!("version {}", outcome.document.version),
        );

        Ok(outcome)
    }

    /// Embed all chunks and derive the document-level vector
    ///
    /// Degradation chain: provider → local fallback (inside the client) →
    /// no embedding at all, in which case the job still succeeds and keeps
    /// `needs_embedding` set.
    async fn embed_chunks(
        ctx: &PipelineContext,
        chunks: &mut [Chunk],
    ) -> Result<Option<Vec<f32>>> {
        if chunks.is_empty() {
            return Ok(None);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        match ctx.embeddings.embed_many(&texts).await {
            Ok(embedded) => {
                let vectors: Vec<Vec<f32>> =
                    embedded.iter().map(|e| e.vector.clone()).collect();
                for (chunk, embedded) in chunks.iter_mut().zip(embedded) {
                    chunk.embedding = Some(embedded.vector);
                }
                Ok(mean_embedding(&vectors))
            }
            Err(Error::EmbeddingUnavailable) | Err(Error::EmbeddingTimeout(_)) => {
                tracing::warn!("No embedding obtained; document stored for deferred backfill");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Provider-backed summary and concepts with local fallbacks
    async fn summarize(
        ctx: &PipelineContext,
        chunks: &[Chunk],
        text: &str,
    ) -> (Option<String>, Option<Vec<String>>) {
        let sample: Vec<&Chunk> = chunks.iter().take(3).collect();
        let results = join_all(
            sample
                .iter()
                .map(|chunk| ctx.provider.summarize_chunk(&chunk.text)),
        )
        .await;

        let mut bullets = Vec::new();
        for result in results {
            match result {
                Ok(chunk_bullets) => bullets.extend(chunk_bullets),
                Err(e) => tracing::debug!("Chunk summary unavailable: {}", e),
            }
        }

        if bullets.is_empty() {
            // Local fallback: no summary, concepts from term frequency
            return (None, Some(top_terms(text, 5)));
        }

        let summary = match ctx.provider.reduce_summaries(&bullets).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::debug!("Summary reduction unavailable: {}", e);
                Some(bullets.join(" "))
            }
        };
        let concepts: Vec<String> = bullets.into_iter().take(5).collect();

        (summary, Some(concepts))
    }

    /// Record a stage completion on the job and push it to subscribers
    fn progress(ctx: &PipelineContext, job_id: Uuid, stage: ProgressStage, detail: String) {
        let updated = ctx.queue.update(job_id, |j| {
            j.metadata.progress_stage = Some(stage);
            j.metadata.progress_detail = if detail.is_empty() {
                None
            } else {
                Some(detail)
            };
        });
        if let Some(job) = updated {
            ctx.notifier.emit(&job);
        }
    }
}

/// Map internal errors onto the job failure taxonomy
fn classify_error(error: &Error) -> JobErrorCode {
    match error {
        Error::PayloadMissing(_) => JobErrorCode::PayloadMissing,
        Error::Normalize(_) => JobErrorCode::ValidationError,
        Error::Provider(_)
        | Error::EmbeddingTimeout(_)
        | Error::EmbeddingUnavailable
        | Error::VersionConflict { .. } => JobErrorCode::PipelineError,
        _ => JobErrorCode::IngestException,
    }
}

/// First characters of the text, for the notification preview
fn preview_excerpt(text: &str) -> String {
    const PREVIEW_CHARS: usize = 240;
    if text.chars().count() <= PREVIEW_CHARS {
        return text.to_string();
    }
    text.chars().take(PREVIEW_CHARS).collect()
}

/// Most frequent longer terms, as a local concepts fallback
fn top_terms(text: &str, count: usize) -> Vec<String> {
    use unicode_segmentation::UnicodeSegmentation;

    let mut frequencies: HashMap<String, usize> = HashMap::new();
    for word in text.unicode_words() {
        if word.chars().count() >= 5 {
            *frequencies.entry(word.to_lowercase()).or_insert(0) += 1;
        }
    }

    let mut terms: Vec<(String, usize)> = frequencies.into_iter().collect();
    terms.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    terms.into_iter().take(count).map(|(term, _)| term).collect()
}

/// Merge normalizer analytics with enrichment results into the document's
/// searchable metadata
fn build_content_meta(
    analytics: &HashMap<String, serde_json::Value>,
    summary: &Option<String>,
    concepts: &Option<Vec<String>>,
) -> HashMap<String, serde_json::Value> {
    let mut meta = analytics.clone();
    if let Some(summary) = summary {
        meta.insert("summary".to_string(), serde_json::json!(summary));
    }
    if let Some(concepts) = concepts {
        meta.insert("concepts".to_string(), serde_json::json!(concepts));
    }
    meta
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_taxonomy_mapping() {
        assert_eq!(
            classify_error(&Error::PayloadMissing("p".into())),
            JobErrorCode::PayloadMissing
        );
        assert_eq!(
            classify_error(&Error::Normalize(
                crate::ingestion::NormalizeError::EmptyInput
            )),
            JobErrorCode::ValidationError
        );
        assert_eq!(
            classify_error(&Error::VersionConflict {
                name: "doc".into(),
                expected: 1
            }),
            JobErrorCode::PipelineError
        );
        assert_eq!(
            classify_error(&Error::internal("boom")),
            JobErrorCode::IngestException
        );
    }

    #[test]
    fn preview_is_bounded() {
        let text = "x".repeat(1000);
        assert_eq!(preview_excerpt(&text).chars().count(), 240);
        assert_eq!(preview_excerpt("short"), "short");
    }

    #[test]
    fn top_terms_ranks_by_frequency() {
        let text = "alpha alpha alpha bravo bravo charlie delta short tiny";
        let terms = top_terms(text, 2);
        assert_eq!(terms, vec!["alpha".to_string(), "bravo".to_string()]);
    }
}
