//! Item catalog with monotone merges and synchronous persistence.
//!
//! Knowledge about an item arrives in fragments from different sources
//! (crawl results, storage queries, finished transcriptions, the
//! summarizer). Each merge only touches the fields its source owns, so a
//! fact is never lost to a less-informed update. Every mutation persists
//! the full catalog before returning; readers and writers go through one
//! lock and no await happens inside it.

mod persist;
mod types;

pub use persist::{CatalogPersistence, JsonFileStore, MemoryStore, DETAILS_KEY, ITEMS_KEY};
pub use types::{derive_media_flags, CatalogEntry, CatalogError, ItemDetail};

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{info, warn};

use crate::backend::{DownloadedEntry, FileEntry, SearchItem};

struct CatalogInner {
    order: Vec<String>,
    items: HashMap<String, SearchItem>,
    details: HashMap<String, ItemDetail>,
}

pub struct CatalogStore {
    inner: Mutex<CatalogInner>,
    persistence: Box<dyn CatalogPersistence>,
}

impl CatalogStore {
    /// Open a catalog over the given persistence, reading back whatever it
    /// holds. Load failures start an empty catalog instead of failing.
    pub fn new(persistence: Box<dyn CatalogPersistence>) -> Self {
        let (items, details) = match persistence.load() {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(error = %e, "failed to load catalog, starting empty");
                (Vec::new(), HashMap::new())
            }
        };
        info!(items = items.len(), "catalog loaded");

        let mut inner = CatalogInner {
            order: Vec::with_capacity(items.len()),
            items: HashMap::with_capacity(items.len()),
            details,
        };
        for item in items {
            if !inner.items.contains_key(&item.item_id) {
                inner.order.push(item.item_id.clone());
            }
            inner.items.insert(item.item_id.clone(), item);
        }

        Self {
            inner: Mutex::new(inner),
            persistence,
        }
    }

    /// Catalog backed by in-memory persistence, for tests.
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStore::new()))
    }

    fn persist(&self, inner: &CatalogInner) {
        let items: Vec<SearchItem> = inner
            .order
            .iter()
            .filter_map(|id| inner.items.get(id).cloned())
            .collect();
        if let Err(e) = self.persistence.save(&items, &inner.details) {
            // The in-memory catalog stays authoritative for this session.
            warn!(error = %e, "failed to persist catalog");
        }
    }

    /// Replace the search-sourced item list with a fresh crawl result.
    /// Detail records survive untouched, including details for items that
    /// fell out of the new list.
    pub fn upsert_from_search(&self, items: Vec<SearchItem>) {
        let mut inner = self.inner.lock().unwrap();
        inner.order.clear();
        inner.items.clear();
        for item in items {
            if !inner.items.contains_key(&item.item_id) {
                inner.order.push(item.item_id.clone());
            }
            inner.items.insert(item.item_id.clone(), item);
        }
        self.persist(&inner);
    }

    /// Merge a storage file inventory for one item: replaces the file list
    /// and the derived audio/video flags, leaves transcripts and summaries
    /// alone.
    pub fn merge_file_info(&self, item_id: &str, files: Vec<FileEntry>) {
        let mut inner = self.inner.lock().unwrap();
        let (has_audio, has_video) = derive_media_flags(&files);
        let detail = inner.details.entry(item_id.to_string()).or_default();
        detail.files = files;
        detail.has_audio = has_audio;
        detail.has_video = has_video;
        self.persist(&inner);
    }

    /// Merge the storage overview into the catalog. Items the backend holds
    /// files for but the catalog has never seen get a stub record so their
    /// files are not orphaned.
    pub fn refresh_downloaded(&self, entries: Vec<DownloadedEntry>) {
        let mut inner = self.inner.lock().unwrap();
        for entry in entries {
            if !inner.items.contains_key(&entry.item_id) {
                inner.order.push(entry.item_id.clone());
                inner.items.insert(
                    entry.item_id.clone(),
                    SearchItem::stub(entry.item_id.clone(), entry.title.clone()),
                );
            }
            let detail = inner.details.entry(entry.item_id.clone()).or_default();
            detail.files = entry.files;
            detail.has_audio = entry.has_audio;
            detail.has_video = entry.has_video;
            detail.has_transcript = entry.has_transcript;
        }
        self.persist(&inner);
    }

    /// Record a finished transcript for an item.
    pub fn merge_transcript(&self, item_id: &str, text: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap();
        let detail = inner.details.entry(item_id.to_string()).or_default();
        detail.transcript = Some(text.into());
        detail.has_transcript = true;
        self.persist(&inner);
    }

    /// Record a summary for an item.
    pub fn merge_summary(&self, item_id: &str, text: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap();
        let detail = inner.details.entry(item_id.to_string()).or_default();
        detail.summary = Some(text.into());
        self.persist(&inner);
    }

    /// Forget everything storage-derived about an item after its files were
    /// deleted: inventory, media flags and transcript. The search metadata
    /// and any summary stay.
    pub fn purge_files(&self, item_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(detail) = inner.details.get_mut(item_id) {
            detail.files.clear();
            detail.has_audio = false;
            detail.has_video = false;
            detail.has_transcript = false;
            detail.transcript = None;
        }
        self.persist(&inner);
    }

    /// True when a transcript exists, either fetched into the catalog or
    /// reported present by storage.
    pub fn has_transcript(&self, item_id: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        inner
            .details
            .get(item_id)
            .map(|d| d.transcript.is_some() || d.has_transcript)
            .unwrap_or(false)
    }

    pub fn has_summary(&self, item_id: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        inner
            .details
            .get(item_id)
            .map(|d| d.summary.is_some())
            .unwrap_or(false)
    }

    pub fn transcript(&self, item_id: &str) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner.details.get(item_id).and_then(|d| d.transcript.clone())
    }

    pub fn detail(&self, item_id: &str) -> Option<ItemDetail> {
        self.inner.lock().unwrap().details.get(item_id).cloned()
    }

    pub fn item(&self, item_id: &str) -> Option<SearchItem> {
        self.inner.lock().unwrap().items.get(item_id).cloned()
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.inner.lock().unwrap().items.contains_key(item_id)
    }

    /// All entries in insertion order.
    pub fn entries(&self) -> Vec<CatalogEntry> {
        let inner = self.inner.lock().unwrap();
        inner
            .order
            .iter()
            .filter_map(|id| {
                inner.items.get(id).map(|item| CatalogEntry {
                    item: item.clone(),
                    detail: inner.details.get(id).cloned().unwrap_or_default(),
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything: items, details and the persisted records.
    pub fn clear_all(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.order.clear();
        inner.items.clear();
        inner.details.clear();
        if let Err(e) = self.persistence.clear() {
            warn!(error = %e, "failed to clear persisted catalog");
        }
        info!("catalog cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file(name: &str) -> FileEntry {
        FileEntry {
            name: name.to_string(),
            size: 10,
        }
    }

    #[test]
    fn test_upsert_keeps_details() {
        let catalog = CatalogStore::in_memory();
        catalog.upsert_from_search(vec![SearchItem::stub("BV1", "one")]);
        catalog.merge_transcript("BV1", "spoken words");

        // A later crawl returns a superset; the transcript survives.
        catalog.upsert_from_search(vec![
            SearchItem::stub("BV1", "one"),
            SearchItem::stub("BV2", "two"),
        ]);

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.transcript("BV1").as_deref(), Some("spoken words"));
    }

    #[test]
    fn test_merge_file_info_owns_only_its_fields() {
        let catalog = CatalogStore::in_memory();
        catalog.upsert_from_search(vec![SearchItem::stub("BV1", "one")]);
        catalog.merge_transcript("BV1", "text");
        catalog.merge_summary("BV1", "short");

        catalog.merge_file_info("BV1", vec![file("a.m4a"), file("v.mp4")]);

        let detail = catalog.detail("BV1").unwrap();
        assert!(detail.has_audio);
        assert!(detail.has_video);
        assert_eq!(detail.transcript.as_deref(), Some("text"));
        assert_eq!(detail.summary.as_deref(), Some("short"));
    }

    #[test]
    fn test_refresh_downloaded_stubs_unknown_items() {
        let catalog = CatalogStore::in_memory();
        catalog.refresh_downloaded(vec![DownloadedEntry {
            item_id: "BV9".to_string(),
            title: "found on disk".to_string(),
            files: vec![file("x.mp3")],
            has_audio: true,
            has_transcript: true,
            ..DownloadedEntry::default()
        }]);

        assert!(catalog.contains("BV9"));
        assert_eq!(catalog.item("BV9").unwrap().title, "found on disk");
        assert!(catalog.has_transcript("BV9"));
        assert!(catalog.transcript("BV9").is_none());
    }

    #[test]
    fn test_has_transcript_from_flag_or_text() {
        let catalog = CatalogStore::in_memory();
        assert!(!catalog.has_transcript("BV1"));

        catalog.merge_transcript("BV1", "words");
        assert!(catalog.has_transcript("BV1"));
    }

    #[test]
    fn test_clear_all() {
        let catalog = CatalogStore::in_memory();
        catalog.upsert_from_search(vec![SearchItem::stub("BV1", "one")]);
        catalog.merge_summary("BV1", "s");

        catalog.clear_all();
        assert!(catalog.is_empty());
        assert!(catalog.detail("BV1").is_none());
    }

    #[test]
    fn test_rebuild_from_disk_after_merges() {
        let dir = TempDir::new().unwrap();

        {
            let catalog = CatalogStore::new(Box::new(JsonFileStore::new(dir.path())));
            catalog.upsert_from_search(vec![
                SearchItem::stub("BV1", "one"),
                SearchItem::stub("BV2", "two"),
            ]);
            catalog.merge_transcript("BV1", "persisted words");
            catalog.merge_file_info("BV2", vec![file("v.webm")]);
        }

        let reopened = CatalogStore::new(Box::new(JsonFileStore::new(dir.path())));
        assert_eq!(reopened.len(), 2);
        assert_eq!(
            reopened.transcript("BV1").as_deref(),
            Some("persisted words")
        );
        let detail = reopened.detail("BV2").unwrap();
        assert!(detail.has_video);
        assert!(!detail.has_audio);
    }

    #[test]
    fn test_entries_preserve_order() {
        let catalog = CatalogStore::in_memory();
        catalog.upsert_from_search(vec![
            SearchItem::stub("BV3", "c"),
            SearchItem::stub("BV1", "a"),
            SearchItem::stub("BV2", "b"),
        ]);

        let ids: Vec<String> = catalog
            .entries()
            .into_iter()
            .map(|e| e.item.item_id)
            .collect();
        assert_eq!(ids, vec!["BV3", "BV1", "BV2"]);
    }
}
