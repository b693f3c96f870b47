//! Pluggable key/value storage interface.
//!
//! `KvStore` is the seam every storage backend implements: `get`/`set`/
//! `delete` for single keys, `batch` for an ordered group of operations a
//! backend applies atomically when it can (and as one uninterrupted
//! sequence when it can't — see each adapter's doc comment).

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::error::IngestResult;

/// One operation in a `batch()` call.
#[derive(Debug, Clone)]
pub enum BatchOp {
    Set(String, Vec<u8>),
    Delete(String),
    Get(String),
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> IngestResult<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>) -> IngestResult<()>;
    async fn delete(&self, key: &str) -> IngestResult<()>;

    /// Apply every op in order. The returned vec has one entry per `Get` op,
    /// in the order those `Get`s appeared (not one entry per op overall).
    async fn batch(&self, ops: Vec<BatchOp>) -> IngestResult<Vec<Option<Vec<u8>>>>;

    /// Release any held resources (connections, file handles). Called once
    /// during `Receiver::shutdown`.
    async fn close(&self) -> IngestResult<()>;
}

/// In-process `HashMap` backend. Batches are applied under a single lock
/// acquisition, so they are genuinely atomic with respect to concurrent
/// `get`/`set`/`delete` calls. Default backend for tests.
#[derive(Default)]
pub struct MemoryKvStore {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> IngestResult<Option<Vec<u8>>> {
        Ok(self.data.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> IngestResult<()> {
        self.data.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> IngestResult<()> {
        self.data.lock().await.remove(key);
        Ok(())
    }

    async fn batch(&self, ops: Vec<BatchOp>) -> IngestResult<Vec<Option<Vec<u8>>>> {
        let mut map = self.data.lock().await;
        let mut results = Vec::new();
        for op in ops {
            match op {
                BatchOp::Set(k, v) => {
                    map.insert(k, v);
                }
                BatchOp::Delete(k) => {
                    map.remove(&k);
                }
                BatchOp::Get(k) => {
                    results.push(map.get(&k).cloned());
                }
            }
        }
        Ok(results)
    }

    async fn close(&self) -> IngestResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = MemoryKvStore::new();
        store.set("k1", b"v1".to_vec()).await.unwrap();
        assert_eq!(store.get("k1").await.unwrap(), Some(b"v1".to_vec()));
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let store = MemoryKvStore::new();
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_removes_key() {
        let store = MemoryKvStore::new();
        store.set("k1", b"v1".to_vec()).await.unwrap();
        store.delete("k1").await.unwrap();
        assert_eq!(store.get("k1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn batch_applies_in_order_and_collects_gets() {
        let store = MemoryKvStore::new();
        let results = store
            .batch(vec![
                BatchOp::Set("a".into(), b"1".to_vec()),
                BatchOp::Set("b".into(), b"2".to_vec()),
                BatchOp::Get("a".into()),
                BatchOp::Delete("a".into()),
                BatchOp::Get("a".into()),
                BatchOp::Get("b".into()),
            ])
            .await
            .unwrap();
        assert_eq!(results, vec![Some(b"1".to_vec()), None, Some(b"2".to_vec())]);
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn close_is_a_no_op() {
        let store = MemoryKvStore::new();
        store.close().await.unwrap();
    }
}
