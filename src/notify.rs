//! Best-effort push notifications on per-session channels

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::types::{IngestJob, JobNotification};

const CHANNEL_CAPACITY: usize = 256;

/// Emits job progress/result payloads to per-session subscribers
///
/// Delivery is at-most-once and best-effort: a missing subscriber is not an
/// error, a lagging subscriber drops old payloads, and emission failures
/// never fail the job that triggered them.
#[derive(Default)]
pub struct Notifier {
    channels: DashMap<String, broadcast::Sender<JobNotification>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a session's notification stream
    pub fn subscribe(&self, session_id: &str) -> broadcast::Receiver<JobNotification> {
        self.channels
            .entry(session_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Push the job's current state to its session channel
    pub fn emit(&self, job: &IngestJob) {
        let Some(sender) = self.channels.get(&job.session_id) else {
            // Nobody listening on this session; that's fine
            return;
        };
        if sender.send(JobNotification::from_job(job)).is_err() {
            tracing::debug!(
                "No active subscribers for session {}, dropping notification",
                job.session_id
            );
        }
    }

    /// Drop a session's channel once the session ends
    pub fn close_session(&self, session_id: &str) {
        self.channels.remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentKind, ProgressStage};

    fn sample_job() -> IngestJob {
        IngestJob::new(
            "u1".into(),
            "s1".into(),
            "doc.txt".into(),
            ContentKind::PlainText,
            5,
            "blobs/doc.txt".into(),
        )
    }

    #[tokio::test]
    async fn subscriber_receives_payload() {
        let notifier = Notifier::new();
        let mut receiver = notifier.subscribe("s1");

        let mut job = sample_job();
        job.metadata.progress_stage = Some(ProgressStage::Parsed);
        notifier.emit(&job);

        let payload = receiver.recv().await.unwrap();
        assert_eq!(payload.id, job.id);
        assert_eq!(payload.session_id, "s1");
        assert_eq!(payload.progress_stage, Some(ProgressStage::Parsed));
    }

    #[tokio::test]
    async fn emit_without_subscriber_is_silent() {
        let notifier = Notifier::new();
        notifier.emit(&sample_job()); // must not panic or error
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let notifier = Notifier::new();
        let mut other = notifier.subscribe("s2");

        notifier.emit(&sample_job()); // session s1

        assert!(matches!(
            other.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
