//! Key-value stores backing the persistence manager.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tabtree_types::{KeyValueStore, StorageError, StorageResult};
use tracing::debug;

/// In-process store. Used in tests and for ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, serde_json::Value>>,
    failures: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` writes fail with [`StorageError::Unavailable`].
    pub fn fail_next_writes(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn value(&self, key: &str) -> Option<serde_json::Value> {
        self.values.lock().get(key).cloned()
    }

    pub fn insert(&self, key: &str, value: serde_json::Value) {
        self.values.lock().insert(key.to_string(), value);
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StorageResult<Option<serde_json::Value>> {
        Ok(self.value(key))
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> StorageResult<()> {
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(StorageError::Unavailable(format!("write of '{key}' rejected")));
        }
        self.insert(key, value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Directory-backed store: one pretty-printed JSON file per key.
///
/// Writes go to a temporary file that is then renamed over the target, so a
/// crash mid-write leaves the previous value intact.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StorageError::Unavailable(format!("invalid key '{key}'")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> StorageResult<Option<serde_json::Value>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> StorageResult<()> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(&value)?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(key, path = %path.display(), "Stored value");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.get("tree_state").await.unwrap().is_none());
        store.set("tree_state", json!({"a": 1})).await.unwrap();
        assert_eq!(store.get("tree_state").await.unwrap(), Some(json!({"a": 1})));
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_injected_failures() {
        let store = MemoryStore::new();
        store.fail_next_writes(2);
        assert!(store.set("k", json!(1)).await.is_err());
        assert!(store.set("k", json!(2)).await.is_err());
        store.set("k", json!(3)).await.unwrap();
        assert_eq!(store.value("k"), Some(json!(3)));
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("state"));

        assert!(store.get("unread_tabs").await.unwrap().is_none());
        store.set("unread_tabs", json!([1, 2])).await.unwrap();
        store.set("unread_tabs", json!([3])).await.unwrap();
        assert_eq!(store.get("unread_tabs").await.unwrap(), Some(json!([3])));
        assert!(dir.path().join("state/unread_tabs.json").is_file());
        assert!(!dir.path().join("state/unread_tabs.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_store_rejects_path_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert!(store.set("../escape", json!(1)).await.is_err());
    }

    #[tokio::test]
    async fn test_file_store_corrupt_value() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tree_state.json"), "{not json").unwrap();
        let store = FileStore::new(dir.path());
        assert!(matches!(
            store.get("tree_state").await,
            Err(StorageError::Serde(_))
        ));
    }
}
