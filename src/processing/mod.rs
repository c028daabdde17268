//! Ingestion job engine: queue, worker pool, and state machine

pub mod job_queue;
pub mod worker;

pub use job_queue::{JobQueue, QueueStats};
pub use worker::{IngestWorker, PipelineContext};
