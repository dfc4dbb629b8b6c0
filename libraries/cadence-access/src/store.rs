//! Key-value stores for root locators
//!
//! Keys are the `path_id` of a source root; values are raw locator bytes.

use crate::error::{AccessError, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use tokio::sync::{Mutex, RwLock};

#[async_trait]
pub trait LocatorStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Removing an absent key is not an error
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Process-local store, lost on exit
#[derive(Default)]
pub struct MemoryLocatorStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryLocatorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocatorStore for MemoryLocatorStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// JSON file store: `{ "<key>": "<base64 locator>" }`
///
/// Every write replaces the file through a temp file and a rename.
pub struct FileLocatorStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileLocatorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<BTreeMap<String, String>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| AccessError::Store(format!("{}: {e}", self.path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec_pretty(entries).map_err(|e| AccessError::Store(e.to_string()))?;
        let temp = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp, json).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl LocatorStore for FileLocatorStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self.load().await?;
        entries
            .get(key)
            .map(|encoded| {
                STANDARD
                    .decode(encoded)
                    .map_err(|e| AccessError::Store(format!("entry {key}: {e}")))
            })
            .transpose()
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await?;
        entries.insert(key.to_string(), STANDARD.encode(value));
        self.save(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await?;
        if entries.remove(key).is_some() {
            self.save(&entries).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryLocatorStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", b"v1").await.unwrap();
        store.set("k", b"v2").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v2".to_vec()));

        store.remove("k").await.unwrap();
        store.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("locators.json");

        let store = FileLocatorStore::new(&path);
        assert_eq!(store.get("root").await.unwrap(), None);
        store.set("root", &[0, 159, 146, 150]).await.unwrap();
        store.set("other", b"x").await.unwrap();
        store.remove("other").await.unwrap();

        let reopened = FileLocatorStore::new(&path);
        assert_eq!(
            reopened.get("root").await.unwrap(),
            Some(vec![0, 159, 146, 150])
        );
        assert_eq!(reopened.get("other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_file_is_a_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locators.json");
        std::fs::write(&path, b"{not json").unwrap();

        let store = FileLocatorStore::new(&path);
        assert!(matches!(store.get("k").await, Err(AccessError::Store(_))));
    }
}
