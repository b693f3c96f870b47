//! File-backed `KvStore`: one file per key under a base directory.
//!
//! Writes go through a temp-file-then-rename so a crash mid-write never
//! leaves a torn value behind for a single key. Batches are serialized under
//! one process-wide mutex and applied as an ordered, non-interleaved
//! sequence — not full cross-key transactional atomicity, but a crash
//! partway through a batch never reorders the remaining ops relative to a
//! concurrent caller.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

use crate::error::{IngestError, IngestResult};
use crate::kv::{BatchOp, KvStore};

pub struct FileKvStore {
    base_dir: PathBuf,
    lock: Mutex<()>,
}

impl FileKvStore {
    pub async fn open(base_dir: impl Into<PathBuf>) -> IngestResult<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).await?;
        Ok(Self {
            base_dir,
            lock: Mutex::new(()),
        })
    }

    /// Map a logical key to a filesystem-safe filename. Keys in this
    /// system are UUIDs or the fixed reserved index key, neither of which
    /// contains path separators, but percent-encode defensively anyway.
    fn path_for(&self, key: &str) -> PathBuf {
        let safe = key.replace(['/', '\\', '\0'], "_");
        self.base_dir.join(safe)
    }

    async fn read_file(&self, path: &Path) -> IngestResult<Option<Vec<u8>>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(IngestError::from(e)),
        }
    }

    async fn write_file(&self, path: &Path, value: &[u8]) -> IngestResult<()> {
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, value).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> IngestResult<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(IngestError::from(e)),
        }
    }
}

#[async_trait]
impl KvStore for FileKvStore {
    async fn get(&self, key: &str) -> IngestResult<Option<Vec<u8>>> {
        let _guard = self.lock.lock().await;
        self.read_file(&self.path_for(key)).await
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> IngestResult<()> {
        let _guard = self.lock.lock().await;
        self.write_file(&self.path_for(key), &value).await
    }

    async fn delete(&self, key: &str) -> IngestResult<()> {
        let _guard = self.lock.lock().await;
        self.delete_file(&self.path_for(key)).await
    }

    async fn batch(&self, ops: Vec<BatchOp>) -> IngestResult<Vec<Option<Vec<u8>>>> {
        let _guard = self.lock.lock().await;
        let mut results = Vec::new();
        for op in ops {
            match op {
                BatchOp::Set(k, v) => self.write_file(&self.path_for(&k), &v).await?,
                BatchOp::Delete(k) => self.delete_file(&self.path_for(&k)).await?,
                BatchOp::Get(k) => results.push(self.read_file(&self.path_for(&k)).await?),
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

    async fn temp_store() -> (FileKvStore, tempfile_dir::TempDir) {
        let dir = tempfile_dir::TempDir::new();
        let store = FileKvStore::open(dir.path()).await.unwrap();
        (store, dir)
    }

    /// Minimal drop-cleanup temp dir so this module does not pull in a
    /// `tempfile` dev-dependency for a handful of tests.
    mod tempfile_dir {
        use std::path::{Path, PathBuf};

        pub struct TempDir(PathBuf);

        impl TempDir {
            pub fn new() -> Self {
                let mut path = std::env::temp_dir();
                path.push(format!("audit-log-core-test-{}", uuid::Uuid::new_v4()));
                Self(path)
            }

            pub fn path(&self) -> &Path {
                &self.0
            }
        }

        impl Drop for TempDir {
            fn drop(&mut self) {
                let _ = std::fs::remove_dir_all(&self.0);
            }
        }
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let (store, _dir) = temp_store().await;
        store.set("k1", b"hello".to_vec()).await.unwrap();
        assert_eq!(store.get("k1").await.unwrap(), Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let (store, _dir) = temp_store().await;
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (store, _dir) = temp_store().await;
        store.delete("never-set").await.unwrap();
        store.set("k1", b"v".to_vec()).await.unwrap();
        store.delete("k1").await.unwrap();
        store.delete("k1").await.unwrap();
        assert_eq!(store.get("k1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn batch_writes_persist_across_reopen() {
        let dir = tempfile_dir::TempDir::new();
        {
            let store = FileKvStore::open(dir.path()).await.unwrap();
            store
                .batch(vec![
                    BatchOp::Set("a".into(), b"1".to_vec()),
                    BatchOp::Set("b".into(), b"2".to_vec()),
                ])
                .await
                .unwrap();
        }
        let reopened = FileKvStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.get("a").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(reopened.get("b").await.unwrap(), Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn keys_with_path_separators_are_sanitized() {
        let (store, _dir) = temp_store().await;
        store.set("a/b", b"v".to_vec()).await.unwrap();
        assert_eq!(store.get("a/b").await.unwrap(), Some(b"v".to_vec()));
    }
}
