// src/core/rc/store.rs

//! `RecordStore`: the persisted "name-records" collection of §6, keyed by
//! primary name. A narrow collaborator interface (§1's "persistent
//! database that stores control records"); `ControlLog` is the durable
//! decision trail, `RecordStore` is the queryable current-state view
//! derived from it.
//!
//! `JsonFileRecordStore` adapts the same load-whole-file-into-memory,
//! rewrite-whole-file-on-mutation idiom `Config::from_file` uses for its
//! own (much smaller) TOML document, here to a JSON-backed record
//! collection.

use crate::core::errors::GnsError;
use crate::core::rc::record::ReconfigurationRecord;
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::error;

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<ReconfigurationRecord>, GnsError>;
    async fn put(&self, record: ReconfigurationRecord) -> Result<(), GnsError>;
    async fn delete(&self, name: &str) -> Result<(), GnsError>;
    async fn list(&self) -> Result<Vec<ReconfigurationRecord>, GnsError>;
}

/// An in-memory `RecordStore`, suitable for tests and for an RC replica
/// that rebuilds its view entirely from `ControlLog::replay` on startup.
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: DashMap<String, ReconfigurationRecord>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get(&self, name: &str) -> Result<Option<ReconfigurationRecord>, GnsError> {
        Ok(self.records.get(name).map(|r| r.clone()))
    }

    async fn put(&self, record: ReconfigurationRecord) -> Result<(), GnsError> {
        self.records.insert(record.name.clone(), record);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), GnsError> {
        self.records.remove(name);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ReconfigurationRecord>, GnsError> {
        Ok(self.records.iter().map(|r| r.clone()).collect())
    }
}

/// A single-file JSON document store. Simple, and enough to survive a
/// restart without a real document database; the whole collection is
/// loaded into memory and rewritten on every mutation, the same
/// load-whole-file/rewrite-whole-file tradeoff a small TOML config
/// document makes.
pub struct JsonFileRecordStore {
    path: PathBuf,
    cache: RwLock<std::collections::HashMap<String, ReconfigurationRecord>>,
}

impl JsonFileRecordStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, GnsError> {
        let path = path.into();
        let cache = if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            let bytes = tokio::fs::read(&path).await?;
            if bytes.is_empty() {
                std::collections::HashMap::new()
            } else {
                serde_json::from_slice(&bytes)?
            }
        } else {
            std::collections::HashMap::new()
        };
        Ok(Self {
            path,
            cache: RwLock::new(cache),
        })
    }

    /// Writes the whole document to a temp file, fsyncs it, then renames
    /// it over `self.path`, so a crash mid-write never leaves the only
    /// copy of the control records truncated or corrupt.
    async fn flush(&self, cache: &std::collections::HashMap<String, ReconfigurationRecord>) -> Result<(), GnsError> {
        let bytes = serde_json::to_vec_pretty(cache)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }

        let temp_path = self.path.with_extension("json.tmp");
        let write_result: Result<(), GnsError> = async {
            let mut file = tokio::fs::File::create(&temp_path).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
            Ok(())
        }
        .await;

        if let Err(e) = write_result {
            if let Err(remove_err) = tokio::fs::remove_file(&temp_path).await {
                error!(%remove_err, path = %temp_path.display(), "failed to remove temp record store file");
            }
            return Err(e);
        }

        tokio::fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for JsonFileRecordStore {
    async fn get(&self, name: &str) -> Result<Option<ReconfigurationRecord>, GnsError> {
        Ok(self.cache.read().await.get(name).cloned())
    }

    async fn put(&self, record: ReconfigurationRecord) -> Result<(), GnsError> {
        let mut cache = self.cache.write().await;
        cache.insert(record.name.clone(), record);
        self.flush(&cache).await
    }

    async fn delete(&self, name: &str) -> Result<(), GnsError> {
        let mut cache = self.cache.write().await;
        cache.remove(name);
        self.flush(&cache).await
    }

    async fn list(&self) -> Result<Vec<ReconfigurationRecord>, GnsError> {
        Ok(self.cache.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::NodeId;

    #[tokio::test]
    async fn in_memory_store_put_get_delete() {
        let store = InMemoryRecordStore::new();
        let rec = ReconfigurationRecord::new_creating("n0", vec![NodeId::new("a")]);
        store.put(rec.clone()).await.unwrap();
        assert_eq!(store.get("n0").await.unwrap().unwrap().epoch, 0);
        store.delete("n0").await.unwrap();
        assert!(store.get("n0").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn json_file_store_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        let rec = ReconfigurationRecord::new_creating("n0", vec![NodeId::new("a")]);

        {
            let store = JsonFileRecordStore::open(&path).await.unwrap();
            store.put(rec.clone()).await.unwrap();
        }

        let reopened = JsonFileRecordStore::open(&path).await.unwrap();
        let loaded = reopened.get("n0").await.unwrap().unwrap();
        assert_eq!(loaded.name, "n0");
    }
}
