//! Batch actions over a selection of catalog items.
//!
//! Each batch filters the selection by an eligibility rule before acting:
//! an item the action would be pointless for is skipped, not failed.
//! Downloads fan out in parallel (the backend queues them itself);
//! summarizations run strictly one at a time with pacing, because the
//! summarizer is rate-sensitive and has no queue of its own.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::backend::{BackendClient, BackendError, DownloadKind, SummarizeRequest};
use crate::catalog::CatalogStore;
use crate::config::{BatchSettings, SummarizerSettings};
use crate::queue::TranscriptionQueue;
use crate::tracker::{TaskTracker, TrackerError};

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("selection contains no item ids")]
    EmptySelection,

    #[error("no download kinds selected")]
    NoKindsSelected,

    #[error("summarizer API key is not configured")]
    MissingApiKey,

    #[error("item has no transcript to summarize: {0}")]
    MissingTranscript(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

/// How a batch went, item by item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub submitted: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum ItemResult {
    Submitted,
    Skipped,
    Failed,
}

pub struct BatchCoordinator {
    backend: Arc<dyn BackendClient>,
    tracker: Arc<TaskTracker>,
    queue: TranscriptionQueue,
    catalog: Arc<CatalogStore>,
    summarizer: SummarizerSettings,
    summary_pacing: Duration,
}

impl BatchCoordinator {
    pub fn new(
        backend: Arc<dyn BackendClient>,
        tracker: Arc<TaskTracker>,
        queue: TranscriptionQueue,
        catalog: Arc<CatalogStore>,
        summarizer: SummarizerSettings,
        settings: &BatchSettings,
    ) -> Self {
        Self {
            backend,
            tracker,
            queue,
            catalog,
            summarizer,
            summary_pacing: settings.summary_pacing(),
        }
    }

    /// Submit one batch download per kind for the whole selection, all
    /// kinds in parallel. The backend runs its own download queue, so there
    /// is nothing to pace here.
    pub async fn batch_download(
        &self,
        item_ids: &[String],
        kinds: &[DownloadKind],
    ) -> Result<BatchOutcome, BatchError> {
        let items = non_blank(item_ids);
        if items.is_empty() {
            return Err(BatchError::EmptySelection);
        }
        if kinds.is_empty() {
            return Err(BatchError::NoKindsSelected);
        }

        let submissions = kinds
            .iter()
            .map(|kind| self.tracker.submit_download(&items, *kind));
        let mut outcome = BatchOutcome::default();
        for (kind, result) in kinds.iter().zip(join_all(submissions).await) {
            match result {
                Ok(job_ids) => outcome.submitted += job_ids.len(),
                Err(e) => {
                    warn!(kind = kind.as_str(), error = %e, "batch download submit failed");
                    outcome.failed += items.len();
                }
            }
        }
        info!(
            submitted = outcome.submitted,
            failed = outcome.failed,
            "batch download dispatched"
        );
        Ok(outcome)
    }

    /// Queue every eligible item for transcription. Eligible means audio is
    /// on disk, no transcript exists yet and the item is not already
    /// queued; everything else is a skip.
    pub async fn batch_transcribe(&self, item_ids: &[String]) -> Result<BatchOutcome, BatchError> {
        let items = non_blank(item_ids);
        if items.is_empty() {
            return Err(BatchError::EmptySelection);
        }

        let catalog = Arc::clone(&self.catalog);
        let queue = self.queue.clone();
        let outcome = run_over_selection(
            &items,
            |item_id| {
                let has_audio = catalog
                    .detail(item_id)
                    .map(|d| d.has_audio)
                    .unwrap_or(false);
                has_audio && !catalog.has_transcript(item_id) && !queue.contains(item_id)
            },
            |item_id| {
                let queue = self.queue.clone();
                async move {
                    match queue.enqueue(&item_id) {
                        Ok(()) => ItemResult::Submitted,
                        Err(e) => {
                            warn!(item_id = %item_id, error = %e, "enqueue conflict, skipping");
                            ItemResult::Skipped
                        }
                    }
                }
            },
            None,
        )
        .await;
        info!(
            submitted = outcome.submitted,
            skipped = outcome.skipped,
            "batch transcription queued"
        );
        Ok(outcome)
    }

    /// Summarize every eligible item, one at a time with pacing. Eligible
    /// means a transcript is in the catalog and no summary exists yet.
    pub async fn batch_summarize(&self, item_ids: &[String]) -> Result<BatchOutcome, BatchError> {
        if self.summarizer.api_key.trim().is_empty() {
            return Err(BatchError::MissingApiKey);
        }
        let items = non_blank(item_ids);
        if items.is_empty() {
            return Err(BatchError::EmptySelection);
        }

        let catalog = Arc::clone(&self.catalog);
        let outcome = run_over_selection(
            &items,
            |item_id| catalog.transcript(item_id).is_some() && !catalog.has_summary(item_id),
            |item_id| async move {
                match self.summarize_item(&item_id).await {
                    Ok(_) => ItemResult::Submitted,
                    Err(e) => {
                        warn!(item_id = %item_id, error = %e, "summarization failed");
                        ItemResult::Failed
                    }
                }
            },
            Some(self.summary_pacing),
        )
        .await;
        info!(
            submitted = outcome.submitted,
            skipped = outcome.skipped,
            failed = outcome.failed,
            "batch summarization finished"
        );
        Ok(outcome)
    }

    /// Summarize one item's transcript and record the result.
    pub async fn summarize_item(&self, item_id: &str) -> Result<String, BatchError> {
        if self.summarizer.api_key.trim().is_empty() {
            return Err(BatchError::MissingApiKey);
        }
        let text = self
            .catalog
            .transcript(item_id)
            .ok_or_else(|| BatchError::MissingTranscript(item_id.to_string()))?;

        let request = SummarizeRequest {
            text,
            base_url: self.summarizer.base_url.clone(),
            api_key: self.summarizer.api_key.clone(),
            model: self.summarizer.model.clone(),
            prompt: self.summarizer.prompt.clone(),
            include_timestamps: self.summarizer.include_timestamps,
        };
        let summary = self.backend.summarize(&request).await?;
        self.catalog.merge_summary(item_id, summary.clone());
        info!(item_id, "summary recorded");
        Ok(summary)
    }
}

fn non_blank(item_ids: &[String]) -> Vec<String> {
    item_ids
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Walk a selection, skipping ineligible items and pacing between the
/// actions that actually run.
async fn run_over_selection<E, A, Fut>(
    items: &[String],
    eligible: E,
    mut action: A,
    pacing: Option<Duration>,
) -> BatchOutcome
where
    E: Fn(&str) -> bool,
    A: FnMut(String) -> Fut,
    Fut: Future<Output = ItemResult>,
{
    let mut outcome = BatchOutcome::default();
    let mut acted = false;
    for item_id in items {
        if !eligible(item_id) {
            outcome.skipped += 1;
            continue;
        }
        if acted {
            if let Some(pause) = pacing {
                sleep(pause).await;
            }
        }
        acted = true;
        match action(item_id.clone()).await {
            ItemResult::Submitted => outcome.submitted += 1,
            ItemResult::Skipped => outcome.skipped += 1,
            ItemResult::Failed => outcome.failed += 1,
        }
    }
    outcome
}
