//! JSON-file storage.
//!
//! The whole map is rewritten on every mutation through a temp file and a
//! rename, so a crash never leaves a half-written session behind. There is no
//! cross-process locking: one client process per file.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::KeyValueStore;
use crate::error::ClientError;

#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<BTreeMap<String, String>, ClientError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                ClientError::storage_unavailable(format!(
                    "{} is not a JSON object of strings: {e}",
                    self.path.display()
                ))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(ClientError::storage_unavailable(format!(
                "failed to read {}: {e}",
                self.path.display()
            ))),
        }
    }

    async fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ClientError::storage_unavailable(format!(
                    "failed to create {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let encoded = serde_json::to_vec_pretty(entries)
            .map_err(|e| ClientError::storage_unavailable(format!("failed to encode: {e}")))?;

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &encoded).await.map_err(|e| {
            ClientError::storage_unavailable(format!("failed to write {}: {e}", tmp.display()))
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            ClientError::storage_unavailable(format!(
                "failed to replace {}: {e}",
                self.path.display()
            ))
        })?;

        debug!(path = %self.path.display(), keys = entries.len(), "[STORAGE] persisted");
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, ClientError> {
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), ClientError> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await?;
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), ClientError> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await?;
        if entries.remove(key).is_none() {
            return Ok(());
        }
        self.persist(&entries).await
    }
}
