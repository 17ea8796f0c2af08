//! Checkpoint store for workflow run state.
//!
//! Keyed by `(session_id, workflow_kind)`; single-writer per key, enforced
//! with a sequence number: a `put` must carry exactly `stored_seq + 1`, so
//! two engines racing on the same run fail one of the writers instead of
//! silently interleaving state.

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use ward_domain::{Error, Result};

/// Checkpoint key: one active run per `(session_id, workflow_kind)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointKey {
    pub session_id: String,
    pub workflow_kind: String,
}

impl CheckpointKey {
    pub fn new(session_id: impl Into<String>, workflow_kind: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            workflow_kind: workflow_kind.into(),
        }
    }

    fn file_stem(&self) -> String {
        // Session ids are UUIDs and kinds are identifiers, so '__' is safe.
        format!("{}__{}", self.session_id, self.workflow_kind)
    }
}

#[async_trait::async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist checkpoint bytes at sequence `seq`. `seq` must be exactly one
    /// greater than the stored sequence (or 1 for a fresh key); anything
    /// else fails with `Conflict`.
    async fn put(&self, key: &CheckpointKey, seq: u64, bytes: Vec<u8>) -> Result<()>;
    async fn get(&self, key: &CheckpointKey) -> Result<Option<(u64, Vec<u8>)>>;
    async fn delete(&self, key: &CheckpointKey) -> Result<()>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct MemoryCheckpointStore {
    entries: RwLock<HashMap<CheckpointKey, (u64, Vec<u8>)>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn put(&self, key: &CheckpointKey, seq: u64, bytes: Vec<u8>) -> Result<()> {
        let mut entries = self.entries.write();
        let stored = entries.get(key).map(|(s, _)| *s).unwrap_or(0);
        if seq != stored + 1 {
            return Err(Error::Conflict(format!(
                "checkpoint seq {seq} for {}/{} does not follow stored seq {stored}",
                key.session_id, key.workflow_kind
            )));
        }
        entries.insert(key.clone(), (seq, bytes));
        Ok(())
    }

    async fn get(&self, key: &CheckpointKey) -> Result<Option<(u64, Vec<u8>)>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn delete(&self, key: &CheckpointKey) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// File-backed store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Serialize, Deserialize)]
struct CheckpointFile {
    seq: u64,
    #[serde(with = "bytes_as_json")]
    state: Vec<u8>,
}

mod bytes_as_json {
    //! Checkpoint payloads are themselves JSON, so store them inline as a
    //! raw value rather than base64 noise.
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(serde::ser::Error::custom)?;
        serde::Serialize::serialize(&value, ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let value = serde_json::Value::deserialize(de)?;
        serde_json::to_vec(&value).map_err(serde::de::Error::custom)
    }
}

/// One JSON file per checkpoint key under a state directory, written with a
/// tmp-rename so a crash never leaves a torn file.
pub struct FileCheckpointStore {
    dir: PathBuf,
    // Guards the read-check-write cycle per process; cross-process callers
    // race on the rename, which is atomic on the same filesystem.
    lock: RwLock<()>,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            lock: RwLock::new(()),
        })
    }

    fn path_for(&self, key: &CheckpointKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.file_stem()))
    }

    fn read_file(&self, key: &CheckpointKey) -> Result<Option<CheckpointFile>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }
}

#[async_trait::async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn put(&self, key: &CheckpointKey, seq: u64, bytes: Vec<u8>) -> Result<()> {
        let _guard = self.lock.write();
        let stored = self.read_file(key)?.map(|f| f.seq).unwrap_or(0);
        if seq != stored + 1 {
            return Err(Error::Conflict(format!(
                "checkpoint seq {seq} for {}/{} does not follow stored seq {stored}",
                key.session_id, key.workflow_kind
            )));
        }
        let file = CheckpointFile { seq, state: bytes };
        let json = serde_json::to_string_pretty(&file)?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    async fn get(&self, key: &CheckpointKey) -> Result<Option<(u64, Vec<u8>)>> {
        let _guard = self.lock.read();
        Ok(self.read_file(key)?.map(|f| (f.seq, f.state)))
    }

    async fn delete(&self, key: &CheckpointKey) -> Result<()> {
        let _guard = self.lock.write();
        let path = self.path_for(key);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_enforces_sequence() {
        let store = MemoryCheckpointStore::new();
        let key = CheckpointKey::new("s1", "admission");

        store.put(&key, 1, b"{\"n\":1}".to_vec()).await.unwrap();
        store.put(&key, 2, b"{\"n\":2}".to_vec()).await.unwrap();

        // Replaying seq 2 (a second writer) must fail.
        let err = store.put(&key, 2, b"{\"n\":9}".to_vec()).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let (seq, bytes) = store.get(&key).await.unwrap().unwrap();
        assert_eq!(seq, 2);
        assert_eq!(bytes, b"{\"n\":2}");
    }

    #[tokio::test]
    async fn fresh_key_starts_at_one() {
        let store = MemoryCheckpointStore::new();
        let key = CheckpointKey::new("s1", "admission");
        let err = store.put(&key, 5, b"{}".to_vec()).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        store.put(&key, 1, b"{}".to_vec()).await.unwrap();
    }

    #[tokio::test]
    async fn file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path()).unwrap();
        let key = CheckpointKey::new("s1", "clinical_decision");

        store
            .put(&key, 1, b"{\"node\":\"extract_symptoms\"}".to_vec())
            .await
            .unwrap();
        let (seq, bytes) = store.get(&key).await.unwrap().unwrap();
        assert_eq!(seq, 1);
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["node"], "extract_symptoms");

        // A second store over the same directory sees the same state —
        // the restart path.
        let store2 = FileCheckpointStore::new(dir.path()).unwrap();
        let (seq2, _) = store2.get(&key).await.unwrap().unwrap();
        assert_eq!(seq2, 1);
        let err = store2.put(&key, 1, b"{}".to_vec()).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        store2.delete(&key).await.unwrap();
        assert!(store2.get(&key).await.unwrap().is_none());
    }
}
