//! Job queue for background ingestion with persistence
//!
//! Live job state is held in a concurrent map and mirrored to SQLite on
//! every mutation, so status polling survives across the job's lifetime.

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::Result;
use crate::storage::DocumentDb;
use crate::types::{IngestJob, JobStatus};

/// Queue of ingestion jobs feeding the worker pool
pub struct JobQueue {
    /// Live jobs with their latest state
    jobs: Arc<DashMap<Uuid, IngestJob>>,
    /// Channel carrying job ids to workers
    sender: mpsc::Sender<Uuid>,
    /// Number of workers configured to drain this queue
    worker_count: usize,
    /// Jobs currently queued or processing
    in_flight: Arc<AtomicUsize>,
    /// Database for persistence
    db: Arc<DocumentDb>,
}

impl JobQueue {
    /// Create a queue; the receiver half goes to the worker pool
    pub fn new(worker_count: usize, db: Arc<DocumentDb>) -> (Self, mpsc::Receiver<Uuid>) {
        let (sender, receiver) = mpsc::channel(1000);

        let queue = Self {
            jobs: Arc::new(DashMap::new()),
            sender,
            worker_count,
            in_flight: Arc::new(AtomicUsize::new(0)),
            db,
        };

        (queue, receiver)
    }

    /// Persist and enqueue a job; returns its id
    pub async fn submit(&self, job: IngestJob) -> Result<Uuid> {
        let job_id = job.id;

        self.db.create_job(&job)?;
        self.jobs.insert(job_id, job);
        self.in_flight.fetch_add(1, Ordering::SeqCst);

        if let Err(e) = self.sender.send(job_id).await {
            tracing::error!("Failed to enqueue job {}: {}", job_id, e);
            self.update(job_id, |j| {
                j.status = JobStatus::Failed;
                j.error_code = Some(crate::types::JobErrorCode::IngestException);
                j.error_message = Some("worker pool is not running".to_string());
                j.finished_at = Some(chrono::Utc::now());
            });
        }

        Ok(job_id)
    }

    /// Latest state of a job: live map first, then the database
    pub fn get(&self, id: &Uuid) -> Option<IngestJob> {
        if let Some(job) = self.jobs.get(id) {
            return Some(job.clone());
        }
        self.db.get_job(id).ok().flatten()
    }

    /// Mutate a job and persist the result; returns the updated record
    pub fn update<F>(&self, id: Uuid, mutate: F) -> Option<IngestJob>
    where
        F: FnOnce(&mut IngestJob),
    {
        let job = {
            let mut entry = self.jobs.get_mut(&id)?;
            let was_terminal = entry.status.is_terminal();
            mutate(&mut entry);
            if !was_terminal && entry.status.is_terminal() {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
            }
            entry.clone()
        };

        if let Err(e) = self.db.update_job(&job) {
            tracing::error!("Failed to persist job {}: {}", id, e);
        }
        Some(job)
    }

    /// All live jobs
    pub fn list(&self) -> Vec<IngestJob> {
        self.jobs.iter().map(|e| e.value().clone()).collect()
    }

    /// Queue statistics for operators
    pub fn stats(&self) -> QueueStats {
        let queued = self
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Queued)
            .count();
        let processing = self
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Processing)
            .count();
        let ready = self
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Ready)
            .count();
        let failed = self
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Failed)
            .count();

        QueueStats {
            total_jobs: self.jobs.len(),
            queued,
            processing,
            ready,
            failed,
            in_flight: self.in_flight.load(Ordering::SeqCst),
            worker_count: self.worker_count,
        }
    }
}

/// Queue statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct QueueStats {
    pub total_jobs: usize,
    pub queued: usize,
    pub processing: usize,
    pub ready: usize,
    pub failed: usize,
    pub in_flight: usize,
    pub worker_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContentKind;

    fn sample_job() -> IngestJob {
        IngestJob::new(
            "u1".into(),
            "s1".into(),
            "doc.txt".into(),
            ContentKind::PlainText,
            10,
            "blobs/doc.txt".into(),
        )
    }

    #[tokio::test]
    async fn submit_persists_and_enqueues() {
        let db = Arc::new(DocumentDb::in_memory().unwrap());
        let (queue, mut receiver) = JobQueue::new(2, db.clone());

        let job_id = queue.submit(sample_job()).await.unwrap();

        assert_eq!(receiver.recv().await, Some(job_id));
        assert!(queue.get(&job_id).is_some());
        assert!(db.get_job(&job_id).unwrap().is_some());
        assert_eq!(queue.stats().in_flight, 1);
    }

    #[tokio::test]
    async fn update_mirrors_to_database() {
        let db = Arc::new(DocumentDb::in_memory().unwrap());
        let (queue, _receiver) = JobQueue::new(1, db.clone());
        let job_id = queue.submit(sample_job()).await.unwrap();

        queue.update(job_id, |j| {
            j.status = JobStatus::Processing;
            j.attempts += 1;
        });

        let persisted = db.get_job(&job_id).unwrap().unwrap();
        assert_eq!(persisted.status, JobStatus::Processing);
        assert_eq!(persisted.attempts, 1);
    }

    #[tokio::test]
    async fn terminal_transition_releases_in_flight() {
        let db = Arc::new(DocumentDb::in_memory().unwrap());
        let (queue, _receiver) = JobQueue::new(1, db);
        let job_id = queue.submit(sample_job()).await.unwrap();
        assert_eq!(queue.stats().in_flight, 1);

        queue.update(job_id, |j| {
            j.status = JobStatus::Ready;
            j.finished_at = Some(chrono::Utc::now());
        });
        assert_eq!(queue.stats().in_flight, 0);

        // Further updates to a terminal job do not double-release
        queue.update(job_id, |j| {
            j.metadata.progress_detail = Some("late note".into());
        });
        assert_eq!(queue.stats().in_flight, 0);
    }
}
