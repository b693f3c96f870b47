//! The live-entry key index: a single JSON array of keys stored at a
//! reserved key in the same `KvStore` the entries themselves live in.
//!
//! All index mutations go through one `tokio::sync::Mutex` held for the
//! duration of a read-modify-write, so two concurrent ingests can never
//! produce a lost update on the index blob itself. The index tolerates
//! "ghost" keys — entries listed in the index whose blob is missing — the
//! reprocessor reconciles those away rather than treating them as a fatal
//! inconsistency.

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{IngestError, IngestResult};
use crate::kv::{BatchOp, KvStore};

pub const INDEX_KEY: &str = "__keys_list__";

pub struct KeyIndex {
    store: Arc<dyn KvStore>,
    lock: Mutex<()>,
}

impl KeyIndex {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    async fn read_list(&self) -> IngestResult<Vec<String>> {
        match self.store.get(INDEX_KEY).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| IngestError::Codec(format!("key index decode: {e}"))),
            None => Ok(Vec::new()),
        }
    }

    fn encode_list(keys: &[String]) -> IngestResult<Vec<u8>> {
        Ok(serde_json::to_vec(keys)?)
    }

    /// Current set of live keys.
    pub async fn list(&self) -> IngestResult<Vec<String>> {
        let _guard = self.lock.lock().await;
        self.read_list().await
    }

    /// Add `key` to the index if it is not already present. No-op if it is.
    pub async fn add_if_absent(&self, key: &str) -> IngestResult<()> {
        let _guard = self.lock.lock().await;
        let mut keys = self.read_list().await?;
        if !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
            self.store.set(INDEX_KEY, Self::encode_list(&keys)?).await?;
        }
        Ok(())
    }

    /// Remove `key` from the index. No-op if it is not present.
    pub async fn remove(&self, key: &str) -> IngestResult<()> {
        let _guard = self.lock.lock().await;
        let mut keys = self.read_list().await?;
        let before = keys.len();
        keys.retain(|k| k != key);
        if keys.len() != before {
            if keys.is_empty() {
                self.store.delete(INDEX_KEY).await?;
            } else {
                self.store.set(INDEX_KEY, Self::encode_list(&keys)?).await?;
            }
        }
        Ok(())
    }

    /// Delete an entry's blob and remove it from the index in a single
    /// batch call, so the two never observably diverge. When the removed
    /// key was the last one live, the index blob itself is deleted rather
    /// than rewritten as an empty array.
    pub async fn delete_entry_and_index(&self, key: &str) -> IngestResult<()> {
        let _guard = self.lock.lock().await;
        let mut keys = self.read_list().await?;
        let before = keys.len();
        keys.retain(|k| k != key);
        let mut ops = vec![BatchOp::Delete(key.to_string())];
        if keys.len() != before {
            if keys.is_empty() {
                ops.push(BatchOp::Delete(INDEX_KEY.to_string()));
            } else {
                ops.push(BatchOp::Set(INDEX_KEY.to_string(), Self::encode_list(&keys)?));
            }
        }
        self.store.batch(ops).await?;
        Ok(())
    }

    /// Add `key` to the index and write its entry blob atomically — an
    /// acknowledged entry is always both persisted and indexed, never one
    /// without the other.
    pub async fn add_entry_atomically(&self, key: &str, entry_bytes: Vec<u8>) -> IngestResult<()> {
        let _guard = self.lock.lock().await;
        let mut keys = self.read_list().await?;
        if !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
        }
        self.store
            .batch(vec![
                BatchOp::Set(key.to_string(), entry_bytes),
                BatchOp::Set(INDEX_KEY.to_string(), Self::encode_list(&keys)?),
            ])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvStore;

    fn index() -> KeyIndex {
        KeyIndex::new(Arc::new(MemoryKvStore::new()))
    }

    #[tokio::test]
    async fn empty_index_lists_nothing() {
        let idx = index();
        assert_eq!(idx.list().await.unwrap(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn add_if_absent_is_idempotent() {
        let idx = index();
        idx.add_if_absent("a").await.unwrap();
        idx.add_if_absent("a").await.unwrap();
        assert_eq!(idx.list().await.unwrap(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn remove_drops_key() {
        let idx = index();
        idx.add_if_absent("a").await.unwrap();
        idx.add_if_absent("b").await.unwrap();
        idx.remove("a").await.unwrap();
        assert_eq!(idx.list().await.unwrap(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn remove_deletes_the_index_blob_once_the_last_key_is_gone() {
        let store = Arc::new(MemoryKvStore::new());
        let idx = KeyIndex::new(store.clone());
        idx.add_if_absent("a").await.unwrap();
        idx.remove("a").await.unwrap();
        assert_eq!(idx.list().await.unwrap(), Vec::<String>::new());
        assert_eq!(store.get(INDEX_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn add_entry_atomically_persists_both_blob_and_index() {
        let store = Arc::new(MemoryKvStore::new());
        let idx = KeyIndex::new(store.clone());
        idx.add_entry_atomically("k1", b"payload".to_vec()).await.unwrap();
        assert_eq!(idx.list().await.unwrap(), vec!["k1".to_string()]);
        assert_eq!(store.get("k1").await.unwrap(), Some(b"payload".to_vec()));
    }

    #[tokio::test]
    async fn delete_entry_and_index_removes_both() {
        let store = Arc::new(MemoryKvStore::new());
        let idx = KeyIndex::new(store.clone());
        idx.add_entry_atomically("k1", b"payload".to_vec()).await.unwrap();
        idx.delete_entry_and_index("k1").await.unwrap();
        assert_eq!(idx.list().await.unwrap(), Vec::<String>::new());
        assert_eq!(store.get("k1").await.unwrap(), None);
        assert_eq!(store.get(INDEX_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn ghost_key_in_index_does_not_panic_on_list() {
        let store = Arc::new(MemoryKvStore::new());
        let idx = KeyIndex::new(store.clone());
        idx.add_if_absent("ghost").await.unwrap();
        // No blob ever written for "ghost" — list() only reports index state.
        assert_eq!(idx.list().await.unwrap(), vec!["ghost".to_string()]);
        assert_eq!(store.get("ghost").await.unwrap(), None);
    }
}
