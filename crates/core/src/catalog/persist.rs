//! Catalog persistence seam.
//!
//! The catalog is persisted as two whole records under fixed keys: the item
//! list and the per-item detail map. Every mutation overwrites both records;
//! init reads both back. Nothing is ever persisted incrementally.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::warn;

use crate::backend::SearchItem;

use super::types::{CatalogError, ItemDetail};

pub const ITEMS_KEY: &str = "items.json";
pub const DETAILS_KEY: &str = "details.json";

type Loaded = (Vec<SearchItem>, HashMap<String, ItemDetail>);

/// Storage backend for catalog snapshots.
pub trait CatalogPersistence: Send + Sync {
    fn save(
        &self,
        items: &[SearchItem],
        details: &HashMap<String, ItemDetail>,
    ) -> Result<(), CatalogError>;

    fn load(&self) -> Result<Loaded, CatalogError>;

    fn clear(&self) -> Result<(), CatalogError>;
}

/// Persists the two records as JSON files in a directory.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn read_or_default<T: Default + serde::de::DeserializeOwned>(&self, key: &str) -> T {
        let path = self.dir.join(key);
        if !path.exists() {
            return T::default();
        }
        match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(value) => value,
                Err(e) => {
                    // A corrupt record loses its data but never blocks init.
                    warn!(key, error = %e, "discarding unreadable catalog record");
                    T::default()
                }
            },
            Err(e) => {
                warn!(key, error = %e, "failed to read catalog record");
                T::default()
            }
        }
    }
}

impl CatalogPersistence for JsonFileStore {
    fn save(
        &self,
        items: &[SearchItem],
        details: &HashMap<String, ItemDetail>,
    ) -> Result<(), CatalogError> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.dir.join(ITEMS_KEY), serde_json::to_vec(items)?)?;
        fs::write(self.dir.join(DETAILS_KEY), serde_json::to_vec(details)?)?;
        Ok(())
    }

    fn load(&self) -> Result<Loaded, CatalogError> {
        Ok((
            self.read_or_default(ITEMS_KEY),
            self.read_or_default(DETAILS_KEY),
        ))
    }

    fn clear(&self) -> Result<(), CatalogError> {
        for key in [ITEMS_KEY, DETAILS_KEY] {
            let path = self.dir.join(key);
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

/// In-memory persistence for tests.
#[derive(Default)]
pub struct MemoryStore {
    saved: Mutex<Option<Loaded>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CatalogPersistence for MemoryStore {
    fn save(
        &self,
        items: &[SearchItem],
        details: &HashMap<String, ItemDetail>,
    ) -> Result<(), CatalogError> {
        *self.saved.lock().unwrap() = Some((items.to_vec(), details.clone()));
        Ok(())
    }

    fn load(&self) -> Result<Loaded, CatalogError> {
        Ok(self.saved.lock().unwrap().clone().unwrap_or_default())
    }

    fn clear(&self) -> Result<(), CatalogError> {
        *self.saved.lock().unwrap() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_json_file_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());

        let items = vec![SearchItem::stub("BV1", "first")];
        let mut details = HashMap::new();
        details.insert(
            "BV1".to_string(),
            ItemDetail {
                has_audio: true,
                transcript: Some("hello".to_string()),
                ..ItemDetail::default()
            },
        );

        store.save(&items, &details).unwrap();
        let (loaded_items, loaded_details) = store.load().unwrap();

        assert_eq!(loaded_items.len(), 1);
        assert_eq!(loaded_items[0].item_id, "BV1");
        let detail = &loaded_details["BV1"];
        assert!(detail.has_audio);
        assert_eq!(detail.transcript.as_deref(), Some("hello"));
    }

    #[test]
    fn test_load_from_empty_dir_yields_empty_catalog() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("does_not_exist_yet"));

        let (items, details) = store.load().unwrap();
        assert!(items.is_empty());
        assert!(details.is_empty());
    }

    #[test]
    fn test_corrupt_record_loads_as_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(ITEMS_KEY), b"{not json").unwrap();
        let store = JsonFileStore::new(dir.path());

        let (items, _) = store.load().unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_clear_removes_records() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());
        store
            .save(&[SearchItem::stub("BV1", "t")], &HashMap::new())
            .unwrap();
        store.clear().unwrap();

        assert!(!dir.path().join(ITEMS_KEY).exists());
        let (items, _) = store.load().unwrap();
        assert!(items.is_empty());
    }
}
