//! Wires the components into one working pipeline and hosts the flows
//! that move backend storage facts into the catalog.

use std::sync::Arc;

use tracing::info;

use crate::backend::{BackendClient, BackendError, HttpBackend};
use crate::batch::BatchCoordinator;
use crate::catalog::{CatalogStore, JsonFileStore};
use crate::config::Config;
use crate::crawl::CrawlSession;
use crate::queue::TranscriptionQueue;
use crate::tracker::TaskTracker;

pub struct MediaDeck {
    backend: Arc<dyn BackendClient>,
    pub tracker: Arc<TaskTracker>,
    pub queue: TranscriptionQueue,
    pub crawl: CrawlSession,
    pub catalog: Arc<CatalogStore>,
    pub batch: BatchCoordinator,
}

impl MediaDeck {
    /// Assemble the pipeline over an explicit backend.
    pub fn new(config: &Config, backend: Arc<dyn BackendClient>) -> Self {
        let catalog = Arc::new(CatalogStore::new(Box::new(JsonFileStore::new(
            config.storage.dir.clone(),
        ))));
        Self::with_catalog(config, backend, catalog)
    }

    /// Assemble the pipeline over an explicit backend and catalog. Used by
    /// tests to swap in in-memory persistence.
    pub fn with_catalog(
        config: &Config,
        backend: Arc<dyn BackendClient>,
        catalog: Arc<CatalogStore>,
    ) -> Self {
        let tracker = Arc::new(TaskTracker::new(
            Arc::clone(&backend),
            config.polling.clone(),
        ));
        let queue = TranscriptionQueue::new(
            Arc::clone(&tracker),
            Arc::clone(&catalog),
            &config.queue,
        );
        let crawl = CrawlSession::new(
            Arc::clone(&backend),
            Arc::clone(&catalog),
            &config.polling,
        );
        let batch = BatchCoordinator::new(
            Arc::clone(&backend),
            Arc::clone(&tracker),
            queue.clone(),
            Arc::clone(&catalog),
            config.summarizer.clone(),
            &config.batch,
        );
        info!(backend = backend.name(), "pipeline assembled");
        Self {
            backend,
            tracker,
            queue,
            crawl,
            catalog,
            batch,
        }
    }

    /// Assemble the pipeline over the HTTP backend named in the config.
    pub fn from_config(config: &Config) -> Result<Self, BackendError> {
        let backend = Arc::new(HttpBackend::new(&config.backend)?);
        Ok(Self::new(config, backend))
    }

    /// Pull the backend's storage overview into the catalog. Returns how
    /// many items the backend reported.
    pub async fn refresh_downloaded(&self) -> Result<usize, BackendError> {
        let entries = self.backend.list_downloads().await?;
        let count = entries.len();
        self.catalog.refresh_downloaded(entries);
        info!(count, "downloaded overview merged");
        Ok(count)
    }

    /// Refresh one item's storage facts: file inventory plus, when storage
    /// holds one, the transcript text.
    pub async fn refresh_item(&self, item_id: &str) -> Result<(), BackendError> {
        let files = self.backend.item_files(item_id).await?;
        self.catalog.merge_file_info(item_id, files);
        if let Some(text) = self.backend.item_transcript(item_id).await? {
            self.catalog.merge_transcript(item_id, text);
        }
        Ok(())
    }

    /// Delete an item's files from backend storage and drop the
    /// storage-derived facts from the catalog.
    pub async fn delete_item(&self, item_id: &str) -> Result<(), BackendError> {
        self.backend.delete_item(item_id).await?;
        self.catalog.purge_files(item_id);
        info!(item_id, "item files deleted");
        Ok(())
    }

    /// Drop the catalog, its persisted records and every tracked task.
    pub fn clear_all(&self) {
        self.catalog.clear_all();
        self.tracker.clear();
    }
}
