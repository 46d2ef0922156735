//! Single-consumer transcription queue.
//!
//! Transcriptions are expensive, so at most one is in flight at a time.
//! Items advance strictly in FIFO order; a failed job logs and advances,
//! it never halts the queue. The head entry stays in the queue while its
//! job runs and cannot be cancelled, matching the backend's lack of a
//! cancel primitive.

mod types;

pub use types::{QueueError, QueueSnapshot};

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::catalog::CatalogStore;
use crate::config::QueueSettings;
use crate::tracker::{TaskStatus, TaskTracker};

struct QueueInner {
    entries: VecDeque<String>,
    active: Option<String>,
    consumer_running: bool,
}

#[derive(Clone)]
pub struct TranscriptionQueue {
    inner: Arc<Mutex<QueueInner>>,
    tracker: Arc<TaskTracker>,
    catalog: Arc<CatalogStore>,
    pacing: Duration,
    formats: Arc<Vec<String>>,
}

impl TranscriptionQueue {
    pub fn new(
        tracker: Arc<TaskTracker>,
        catalog: Arc<CatalogStore>,
        settings: &QueueSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(QueueInner {
                entries: VecDeque::new(),
                active: None,
                consumer_running: false,
            })),
            tracker,
            catalog,
            pacing: settings.pacing(),
            formats: Arc::new(settings.formats.clone()),
        }
    }

    /// Add an item to the queue and start the consumer if it is not
    /// running. Conflicts are reported synchronously, before the item is
    /// admitted.
    pub fn enqueue(&self, item_id: &str) -> Result<(), QueueError> {
        let item_id = item_id.trim().to_string();
        if item_id.is_empty() {
            return Err(QueueError::BlankItemId);
        }
        if self.catalog.has_transcript(&item_id) {
            return Err(QueueError::AlreadyTranscribed(item_id));
        }

        let start_consumer = {
            let mut inner = self.inner.lock().unwrap();
            if inner.entries.contains(&item_id) {
                return Err(QueueError::AlreadyQueued(item_id));
            }
            inner.entries.push_back(item_id.clone());
            if inner.consumer_running {
                false
            } else {
                inner.consumer_running = true;
                true
            }
        };

        debug!(item_id = %item_id, "item queued for transcription");
        if start_consumer {
            tokio::spawn(self.clone().run_consumer());
        }
        Ok(())
    }

    /// Remove a waiting item from the queue. The active head cannot be
    /// cancelled; an item that is not queued at all is a no-op.
    pub fn cancel(&self, item_id: &str) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.active.as_deref() == Some(item_id) {
            return Err(QueueError::CannotCancelActive(item_id.to_string()));
        }
        if let Some(pos) = inner.entries.iter().position(|e| e == item_id) {
            inner.entries.remove(pos);
            debug!(item_id, "item removed from transcription queue");
        }
        Ok(())
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.inner
            .lock()
            .unwrap()
            .entries
            .iter()
            .any(|e| e == item_id)
    }

    pub fn active(&self) -> Option<String> {
        self.inner.lock().unwrap().active.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let inner = self.inner.lock().unwrap();
        QueueSnapshot {
            entries: inner.entries.iter().cloned().collect(),
            active: inner.active.clone(),
        }
    }

    async fn run_consumer(self) {
        loop {
            let item_id = {
                let mut inner = self.inner.lock().unwrap();
                match inner.entries.front().cloned() {
                    Some(item) => {
                        inner.active = Some(item.clone());
                        item
                    }
                    None => {
                        inner.active = None;
                        inner.consumer_running = false;
                        return;
                    }
                }
            };

            self.process(&item_id).await;

            {
                let mut inner = self.inner.lock().unwrap();
                inner.active = None;
                if inner.entries.front().map(|f| f == &item_id).unwrap_or(false) {
                    inner.entries.pop_front();
                }
            }

            sleep(self.pacing).await;
        }
    }

    async fn process(&self, item_id: &str) {
        let job_id = match self.tracker.submit_transcription(item_id, &self.formats).await {
            Ok(job_id) => job_id,
            Err(e) => {
                warn!(item_id, error = %e, "transcription submit failed, queue advances");
                return;
            }
        };

        let Some(task) = self.tracker.await_terminal(&job_id).await else {
            return;
        };

        if task.status == TaskStatus::Completed {
            info!(item_id, job_id = %job_id, "transcription completed");
            if let Some(text) = task.text {
                self.catalog.merge_transcript(item_id, text);
            }
        } else {
            warn!(item_id, job_id = %job_id, message = %task.message, "transcription failed, queue advances");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{TranscriptionPhase, TranscriptionStatusReport};
    use crate::config::PollingSettings;
    use crate::testing::MockBackend;

    fn completed_report(text: &str) -> TranscriptionStatusReport {
        TranscriptionStatusReport {
            status: TranscriptionPhase::Completed,
            progress: 100.0,
            message: String::new(),
            text: Some(text.to_string()),
            segments: None,
            duration: None,
        }
    }

    fn stuck_report() -> TranscriptionStatusReport {
        TranscriptionStatusReport {
            status: TranscriptionPhase::Transcribing,
            progress: 10.0,
            message: String::new(),
            text: None,
            segments: None,
            duration: None,
        }
    }

    fn fast_intervals() -> PollingSettings {
        PollingSettings {
            download_interval_ms: 5,
            transcription_warmup_interval_ms: 5,
            transcription_interval_ms: 5,
            crawl_interval_ms: 5,
            retry_backoff_ms: 5,
        }
    }

    fn queue_with(backend: Arc<MockBackend>) -> (TranscriptionQueue, Arc<CatalogStore>) {
        let tracker = Arc::new(TaskTracker::new(backend, fast_intervals()));
        let catalog = Arc::new(CatalogStore::in_memory());
        let settings = QueueSettings {
            pacing_ms: 1,
            formats: vec!["txt".to_string()],
        };
        (
            TranscriptionQueue::new(tracker, Arc::clone(&catalog), &settings),
            catalog,
        )
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..500 {
            if cond() {
                return;
            }
            sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_enqueue_rejects_transcribed_item() {
        let backend = Arc::new(MockBackend::new());
        let (queue, catalog) = queue_with(backend);
        catalog.merge_transcript("BV1", "already done");

        let result = queue.enqueue("BV1");
        assert_eq!(result, Err(QueueError::AlreadyTranscribed("BV1".into())));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_rejects_blank_id() {
        let backend = Arc::new(MockBackend::new());
        let (queue, _) = queue_with(backend.clone());

        assert_eq!(queue.enqueue("   "), Err(QueueError::BlankItemId));
        assert_eq!(queue.enqueue(""), Err(QueueError::BlankItemId));
        assert!(queue.is_empty());
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_of_queued_head_succeeds_before_it_starts() {
        let backend = Arc::new(MockBackend::new());
        let (queue, _) = queue_with(backend.clone());

        // The consumer has not run yet, so the head is not active.
        queue.enqueue("BV1").unwrap();
        assert_eq!(queue.cancel("BV1"), Ok(()));
        assert!(queue.is_empty());

        sleep(Duration::from_millis(50)).await;
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_rejects_duplicate() {
        let backend = Arc::new(MockBackend::new());
        backend.script_transcription_status("transcribe_BV1", vec![stuck_report()]);
        let (queue, _) = queue_with(backend);

        queue.enqueue("BV1").unwrap();
        let result = queue.enqueue("BV1");
        assert_eq!(result, Err(QueueError::AlreadyQueued("BV1".into())));
    }

    #[tokio::test]
    async fn test_completed_job_merges_transcript_and_advances() {
        let backend = Arc::new(MockBackend::new());
        backend.set_transcription_cache("BV1", completed_report("words one"));
        backend.set_transcription_cache("BV2", completed_report("words two"));
        let (queue, catalog) = queue_with(backend);

        queue.enqueue("BV1").unwrap();
        queue.enqueue("BV2").unwrap();

        let probe = queue.clone();
        wait_until(move || probe.is_empty()).await;
        assert_eq!(catalog.transcript("BV1").as_deref(), Some("words one"));
        assert_eq!(catalog.transcript("BV2").as_deref(), Some("words two"));
    }

    #[tokio::test]
    async fn test_cancel_semantics() {
        let backend = Arc::new(MockBackend::new());
        backend.script_transcription_status("transcribe_BV1", vec![stuck_report()]);
        let (queue, _) = queue_with(backend);

        queue.enqueue("BV1").unwrap();
        queue.enqueue("BV2").unwrap();

        let probe = queue.clone();
        wait_until(move || probe.active().as_deref() == Some("BV1")).await;

        // The head is active and protected; waiting entries are removable;
        // unknown entries are a no-op.
        assert_eq!(
            queue.cancel("BV1"),
            Err(QueueError::CannotCancelActive("BV1".into()))
        );
        assert_eq!(queue.cancel("BV2"), Ok(()));
        assert!(!queue.contains("BV2"));
        assert_eq!(queue.cancel("BV99"), Ok(()));
    }

    #[tokio::test]
    async fn test_failed_job_advances_queue() {
        let backend = Arc::new(MockBackend::new());
        backend.script_transcription_status(
            "transcribe_BV1",
            vec![TranscriptionStatusReport {
                status: TranscriptionPhase::Error,
                progress: 0.0,
                message: "no audio file".to_string(),
                text: None,
                segments: None,
                duration: None,
            }],
        );
        backend.set_transcription_cache("BV2", completed_report("second"));
        let (queue, catalog) = queue_with(backend);

        queue.enqueue("BV1").unwrap();
        queue.enqueue("BV2").unwrap();

        let probe = queue.clone();
        wait_until(move || probe.is_empty()).await;
        assert!(catalog.transcript("BV1").is_none());
        assert_eq!(catalog.transcript("BV2").as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_snapshot_reports_active_head() {
        let backend = Arc::new(MockBackend::new());
        backend.script_transcription_status("transcribe_BV1", vec![stuck_report()]);
        let (queue, _) = queue_with(backend);

        queue.enqueue("BV1").unwrap();
        queue.enqueue("BV2").unwrap();

        let probe = queue.clone();
        wait_until(move || probe.active().is_some()).await;

        let snapshot = queue.snapshot();
        assert_eq!(snapshot.entries, vec!["BV1", "BV2"]);
        assert_eq!(snapshot.active.as_deref(), Some("BV1"));
    }
}
