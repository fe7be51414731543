//! Record persistence.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::record::{validate_slug, PageRecord};

/// Errors that can occur while reading or writing records.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid slug: {0:?}")]
    InvalidSlug(String),

    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt record {path}: {message}")]
    Corrupt { path: PathBuf, message: String },
}

/// Where page records live.
pub trait PageStore: Send + Sync {
    /// The record for `slug`, if one was saved.
    fn get(&self, slug: &str) -> Result<Option<PageRecord>, StoreError>;

    /// Insert or replace the record with the same slug.
    fn put(&self, record: &PageRecord) -> Result<(), StoreError>;

    /// Every record, ordered by slug.
    fn list(&self) -> Result<Vec<PageRecord>, StoreError>;
}

/// One pretty-printed JSON file per slug.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, slug: &str) -> Result<PathBuf, StoreError> {
        if !validate_slug(slug) {
            return Err(StoreError::InvalidSlug(slug.to_string()));
        }
        Ok(self.dir.join(format!("{slug}.json")))
    }

    fn read(path: &Path) -> Result<PageRecord, StoreError> {
        let content = fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

impl PageStore for JsonFileStore {
    fn get(&self, slug: &str) -> Result<Option<PageRecord>, StoreError> {
        let path = self.path_for(slug)?;
        if !path.exists() {
            return Ok(None);
        }
        Self::read(&path).map(Some)
    }

    fn put(&self, record: &PageRecord) -> Result<(), StoreError> {
        let path = self.path_for(&record.slug)?;
        let io_error = |source| StoreError::Io {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(io_error)?;
        let json = serde_json::to_string_pretty(record).map_err(|e| StoreError::Corrupt {
            path: path.clone(),
            message: e.to_string(),
        })?;

        // Write beside the target, then rename over it
        let staging = self.dir.join(format!(".{}.json.tmp", record.slug));
        fs::write(&staging, json).map_err(io_error)?;
        fs::rename(&staging, &path).map_err(io_error)?;

        tracing::debug!("Stored record {}", path.display());
        Ok(())
    }

    fn list(&self) -> Result<Vec<PageRecord>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut records = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            let is_record = path.extension().and_then(|e| e.to_str()) == Some("json")
                && !entry.file_name().to_string_lossy().starts_with('.');
            if is_record {
                records.push(Self::read(&path)?);
            }
        }
        records.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(records)
    }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, PageRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, PageRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PageStore for MemoryStore {
    fn get(&self, slug: &str) -> Result<Option<PageRecord>, StoreError> {
        Ok(self.records().get(slug).cloned())
    }

    fn put(&self, record: &PageRecord) -> Result<(), StoreError> {
        if !validate_slug(&record.slug) {
            return Err(StoreError::InvalidSlug(record.slug.clone()));
        }
        self.records().insert(record.slug.clone(), record.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<PageRecord>, StoreError> {
        Ok(self.records().values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn record(slug: &str) -> PageRecord {
        PageRecord {
            title: slug.to_uppercase(),
            slug: slug.to_string(),
            source_text: "return <View/>;".to_string(),
            compiled_artifact: "return React.createElement(View, null);".to_string(),
            registry_version: 1,
            is_published: true,
        }
    }

    #[test]
    fn json_store_round_trips_records() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("records"));

        assert_eq!(store.get("home").unwrap(), None);
        store.put(&record("home")).unwrap();
        store.put(&record("about")).unwrap();

        assert_eq!(store.get("home").unwrap(), Some(record("home")));
        let slugs: Vec<String> = store.list().unwrap().into_iter().map(|r| r.slug).collect();
        assert_eq!(slugs, vec!["about", "home"]);
        assert!(!dir.path().join("records/.home.json.tmp").exists());
    }

    #[test]
    fn json_store_rejects_unsafe_slugs() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(matches!(store.put(&record("../x")), Err(StoreError::InvalidSlug(_))));
        assert!(matches!(store.get("a/b"), Err(StoreError::InvalidSlug(_))));
    }

    #[test]
    fn corrupt_files_are_reported() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("home.json"), "{ not json").unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(matches!(store.get("home"), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn memory_store_replaces_by_slug() {
        let store = MemoryStore::new();
        store.put(&record("home")).unwrap();
        let mut updated = record("home");
        updated.title = "Updated".to_string();
        store.put(&updated).unwrap();
        assert_eq!(store.list().unwrap(), vec![updated]);
    }
}
