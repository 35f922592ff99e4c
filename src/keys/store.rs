//! Key storage tiers
//!
//! Two independent tiers hold the identity's private key: a primary
//! keyed record store and a secondary flat store. Either tier may be
//! entirely unavailable in restricted environments — that is a normal
//! condition the manager degrades around, not an exceptional one.
//!
//! The primary tier has an explicit lifecycle
//! (`Uninitialized → SchemaEnsured → Ready`) driven by one idempotent
//! `ensure_ready()`; every operation ensures readiness itself, so
//! callers never sequence initialization by hand.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::StoreError;

/// Logical key under which the identity private key lives in both tiers.
pub const IDENTITY_KEY_ID: &str = "crypto-key";

/// Primary-tier record: `{ "id": "crypto-key", "privateKey": <base64> }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredIdentity {
    pub id: String,
    pub private_key: String,
}

/// Primary store initialization state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreLifecycle {
    Uninitialized,
    /// Backing schema (directory, collection) exists but has not been
    /// verified usable.
    SchemaEnsured,
    Ready,
}

/// Keyed, transactional-per-record store. The durable tier.
#[async_trait]
pub trait PrimaryKeyStore: Send + Sync {
    /// Drive the lifecycle to `Ready`. Idempotent; concurrent callers
    /// converge on one transition.
    async fn ensure_ready(&self) -> Result<(), StoreError>;

    /// Current lifecycle state.
    async fn lifecycle(&self) -> StoreLifecycle;

    async fn get_record(&self, id: &str) -> Result<Option<StoredIdentity>, StoreError>;

    async fn put_record(&self, record: StoredIdentity) -> Result<(), StoreError>;

    async fn delete_record(&self, id: &str) -> Result<(), StoreError>;
}

/// Flat string store. The fallback tier.
#[async_trait]
pub trait SecondaryKeyStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    async fn clear_all(&self) -> Result<(), StoreError>;
}

/// In-memory primary store. Reference implementation for tests and for
/// hosts whose durable tier is blocked.
#[derive(Default)]
pub struct MemoryPrimaryStore {
    state: RwLock<Option<HashMap<String, StoredIdentity>>>,
}

impl MemoryPrimaryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PrimaryKeyStore for MemoryPrimaryStore {
    async fn ensure_ready(&self) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.is_none() {
            *state = Some(HashMap::new());
        }
        Ok(())
    }

    async fn lifecycle(&self) -> StoreLifecycle {
        if self.state.read().await.is_some() {
            StoreLifecycle::Ready
        } else {
            StoreLifecycle::Uninitialized
        }
    }

    async fn get_record(&self, id: &str) -> Result<Option<StoredIdentity>, StoreError> {
        self.ensure_ready().await?;
        let state = self.state.read().await;
        Ok(state.as_ref().and_then(|records| records.get(id).cloned()))
    }

    async fn put_record(&self, record: StoredIdentity) -> Result<(), StoreError> {
        self.ensure_ready().await?;
        let mut state = self.state.write().await;
        state
            .as_mut()
            .ok_or_else(|| StoreError::Unavailable("store not ready".into()))?
            .insert(record.id.clone(), record);
        Ok(())
    }

    async fn delete_record(&self, id: &str) -> Result<(), StoreError> {
        self.ensure_ready().await?;
        let mut state = self.state.write().await;
        if let Some(records) = state.as_mut() {
            records.remove(id);
        }
        Ok(())
    }
}

/// File-backed primary store: one `{id}.json` file per record in a
/// dedicated directory.
pub struct FilePrimaryStore {
    dir: PathBuf,
    lifecycle: RwLock<StoreLifecycle>,
}

impl FilePrimaryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lifecycle: RwLock::new(StoreLifecycle::Uninitialized),
        }
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }
}

#[async_trait]
impl PrimaryKeyStore for FilePrimaryStore {
    async fn ensure_ready(&self) -> Result<(), StoreError> {
        let mut lifecycle = self.lifecycle.write().await;
        if *lifecycle == StoreLifecycle::Ready {
            return Ok(());
        }

        if *lifecycle == StoreLifecycle::Uninitialized {
            tokio::fs::create_dir_all(&self.dir)
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            *lifecycle = StoreLifecycle::SchemaEnsured;
        }

        // Schema exists; verify it is actually usable before reporting
        // ready.
        tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        *lifecycle = StoreLifecycle::Ready;
        Ok(())
    }

    async fn lifecycle(&self) -> StoreLifecycle {
        *self.lifecycle.read().await
    }

    async fn get_record(&self, id: &str) -> Result<Option<StoredIdentity>, StoreError> {
        self.ensure_ready().await?;
        let path = self.record_path(id);
        match tokio::fs::read(&path).await {
            Ok(data) => {
                let record: StoredIdentity = serde_json::from_slice(&data)
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?;
                Ok(Some(record))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e.to_string())),
        }
    }

    async fn put_record(&self, record: StoredIdentity) -> Result<(), StoreError> {
        self.ensure_ready().await?;
        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        tokio::fs::write(self.record_path(&record.id), json)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))
    }

    async fn delete_record(&self, id: &str) -> Result<(), StoreError> {
        self.ensure_ready().await?;
        match tokio::fs::remove_file(self.record_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e.to_string())),
        }
    }
}

/// In-memory secondary store.
#[derive(Default)]
pub struct MemorySecondaryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemorySecondaryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecondaryKeyStore for MemorySecondaryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        self.entries.write().await.clear();
        Ok(())
    }
}

/// File-backed secondary store: one JSON object of flat entries.
pub struct FileSecondaryStore {
    path: PathBuf,
}

impl FileSecondaryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read_entries(&self) -> Result<HashMap<String, String>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(data) => {
                serde_json::from_slice(&data).map_err(|e| StoreError::Corrupt(e.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(StoreError::Io(e.to_string())),
        }
    }

    async fn write_entries(&self, entries: &HashMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))
    }
}

#[async_trait]
impl SecondaryKeyStore for FileSecondaryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_entries().await?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.read_entries().await?;
        entries.insert(key.to_string(), value.to_string());
        self.write_entries(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.read_entries().await?;
        if entries.remove(key).is_some() {
            self.write_entries(&entries).await?;
        }
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_record(private_key: &str) -> StoredIdentity {
        StoredIdentity {
            id: IDENTITY_KEY_ID.to_string(),
            private_key: private_key.to_string(),
        }
    }

    #[tokio::test]
    async fn test_memory_primary_round_trip() {
        let store = MemoryPrimaryStore::new();
        assert_eq!(store.lifecycle().await, StoreLifecycle::Uninitialized);

        store.put_record(make_record("abc")).await.unwrap();
        assert_eq!(store.lifecycle().await, StoreLifecycle::Ready);

        let record = store.get_record(IDENTITY_KEY_ID).await.unwrap().unwrap();
        assert_eq!(record.private_key, "abc");

        store.delete_record(IDENTITY_KEY_ID).await.unwrap();
        assert_eq!(store.get_record(IDENTITY_KEY_ID).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ensure_ready_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePrimaryStore::new(dir.path().join("keys"));

        assert_eq!(store.lifecycle().await, StoreLifecycle::Uninitialized);
        store.ensure_ready().await.unwrap();
        assert_eq!(store.lifecycle().await, StoreLifecycle::Ready);
        store.ensure_ready().await.unwrap();
        assert_eq!(store.lifecycle().await, StoreLifecycle::Ready);
    }

    #[tokio::test]
    async fn test_file_primary_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys");

        {
            let store = FilePrimaryStore::new(&path);
            store.put_record(make_record("persisted")).await.unwrap();
        }

        let store = FilePrimaryStore::new(&path);
        let record = store.get_record(IDENTITY_KEY_ID).await.unwrap().unwrap();
        assert_eq!(record.private_key, "persisted");
    }

    #[tokio::test]
    async fn test_file_primary_record_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys");
        let store = FilePrimaryStore::new(&path);
        store.put_record(make_record("layout")).await.unwrap();

        let raw = tokio::fs::read_to_string(path.join("crypto-key.json"))
            .await
            .unwrap();
        // Field naming is part of the persisted contract
        assert!(raw.contains("\"privateKey\""));
        assert!(raw.contains("\"id\""));
    }

    #[tokio::test]
    async fn test_file_primary_corrupt_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys");
        let store = FilePrimaryStore::new(&path);
        store.ensure_ready().await.unwrap();

        tokio::fs::write(path.join("crypto-key.json"), b"{ not json")
            .await
            .unwrap();
        let result = store.get_record(IDENTITY_KEY_ID).await;
        assert!(matches!(result, Err(StoreError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_memory_secondary_round_trip() {
        let store = MemorySecondaryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));

        store.clear_all().await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_secondary_round_trip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecondaryStore::new(dir.path().join("flat.json"));

        store.set(IDENTITY_KEY_ID, "value").await.unwrap();
        store.set("other", "kept?").await.unwrap();
        assert_eq!(
            store.get(IDENTITY_KEY_ID).await.unwrap(),
            Some("value".to_string())
        );

        store.clear_all().await.unwrap();
        assert_eq!(store.get(IDENTITY_KEY_ID).await.unwrap(), None);
        assert_eq!(store.get("other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_secondary_remove_single_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecondaryStore::new(dir.path().join("flat.json"));

        store.set("a", "1").await.unwrap();
        store.set("b", "2").await.unwrap();
        store.remove("a").await.unwrap();

        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.get("b").await.unwrap(), Some("2".to_string()));
    }
}
