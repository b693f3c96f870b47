//! Embedded-SQL `KvStore` backed by `rusqlite`.
//!
//! A single connection behind a `parking_lot::Mutex`, blocking `rusqlite`
//! calls made directly from async methods (no `spawn_blocking` — the calls
//! are fast local file I/O, not network I/O), WAL mode for concurrent
//! readers, `execute_batch` for schema setup. Batches are wrapped in a SQL
//! transaction, giving this backend real atomicity.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection};

use crate::error::{IngestError, IngestResult};
use crate::kv::{BatchOp, KvStore};

pub struct SqlKvStore {
    conn: Mutex<Connection>,
}

impl SqlKvStore {
    pub fn open(path: impl AsRef<std::path::Path>) -> IngestResult<Self> {
        let conn = Connection::open(path).map_err(|e| IngestError::Storage(e.to_string()))?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> IngestResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| IngestError::Storage(e.to_string()))?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init(conn: &Connection) -> IngestResult<()> {
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             CREATE TABLE IF NOT EXISTS kv (
                 key TEXT PRIMARY KEY,
                 value BLOB NOT NULL
             );",
        )
        .map_err(|e| IngestError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl KvStore for SqlKvStore {
    async fn get(&self, key: &str) -> IngestResult<Option<Vec<u8>>> {
        let conn = self.conn.lock();
        conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
            row.get::<_, Vec<u8>>(0)
        })
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(IngestError::Storage(other.to_string())),
        })
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> IngestResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )
        .map_err(|e| IngestError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> IngestResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
            .map_err(|e| IngestError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn batch(&self, ops: Vec<BatchOp>) -> IngestResult<Vec<Option<Vec<u8>>>> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| IngestError::Storage(e.to_string()))?;
        let mut results = Vec::new();
        for op in ops {
            match op {
                BatchOp::Set(k, v) => {
                    tx.execute(
                        "INSERT INTO kv (key, value) VALUES (?1, ?2)
                         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                        params![k, v],
                    )
                    .map_err(|e| IngestError::Storage(e.to_string()))?;
                }
                BatchOp::Delete(k) => {
                    tx.execute("DELETE FROM kv WHERE key = ?1", params![k])
                        .map_err(|e| IngestError::Storage(e.to_string()))?;
                }
                BatchOp::Get(k) => {
                    let value = tx
                        .query_row("SELECT value FROM kv WHERE key = ?1", params![k], |row| {
                            row.get::<_, Vec<u8>>(0)
                        })
                        .map(Some)
                        .or_else(|e| match e {
                            rusqlite::Error::QueryReturnedNoRows => Ok(None),
                            other => Err(IngestError::Storage(other.to_string())),
                        })?;
                    results.push(value);
                }
            }
        }
        tx.commit().map_err(|e| IngestError::Storage(e.to_string()))?;
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
        let store = SqlKvStore::open_in_memory().unwrap();
        store.set("k1", b"v1".to_vec()).await.unwrap();
        assert_eq!(store.get("k1").await.unwrap(), Some(b"v1".to_vec()));
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let store = SqlKvStore::open_in_memory().unwrap();
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_overwrites_existing_value() {
        let store = SqlKvStore::open_in_memory().unwrap();
        store.set("k1", b"v1".to_vec()).await.unwrap();
        store.set("k1", b"v2".to_vec()).await.unwrap();
        assert_eq!(store.get("k1").await.unwrap(), Some(b"v2".to_vec()));
    }

    #[tokio::test]
    async fn batch_is_atomic_within_a_transaction() {
        let store = SqlKvStore::open_in_memory().unwrap();
        let results = store
            .batch(vec![
                BatchOp::Set("a".into(), b"1".to_vec()),
                BatchOp::Get("a".into()),
                BatchOp::Delete("a".into()),
                BatchOp::Get("a".into()),
            ])
            .await
            .unwrap();
        assert_eq!(results, vec![Some(b"1".to_vec()), None]);
    }
}
