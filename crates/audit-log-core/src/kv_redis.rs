//! Redis-backed `KvStore`, behind the `redis-backend` feature.
//!
//! Grounded in the pack's `pmcp` Redis task-store backend: a
//! `MultiplexedConnection` held behind a `tokio::sync::Mutex` (the
//! connection itself is cheaply cloneable and pipeline-safe, but batched
//! `MULTI`/`EXEC` sequences still need to run without another caller's
//! commands interleaving), atomic batches via a `redis::pipe()` wrapped in
//! `MULTI`/`EXEC`, and a bounded-retry, explicitly-timed-out connect
//! sequence — a connect failure that exhausts its retries is a fatal start
//! error, not a lazily-discovered one.

use async_trait::async_trait;
use redis::AsyncCommands;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::error::{IngestError, IngestResult};
use crate::kv::{BatchOp, KvStore};

const CONNECT_RETRIES: u32 = 3;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const RETRY_BACKOFF_BASE: Duration = Duration::from_millis(200);

pub struct RedisKvStore {
    conn: Mutex<redis::aio::MultiplexedConnection>,
}

impl RedisKvStore {
    /// Connect with bounded retries. Each attempt is wrapped in
    /// `CONNECT_TIMEOUT`; exhausting `CONNECT_RETRIES` is a fatal error.
    pub async fn connect(url: &str) -> IngestResult<Self> {
        let client =
            redis::Client::open(url).map_err(|e| IngestError::Config(e.to_string()))?;

        let mut last_err = None;
        for attempt in 0..CONNECT_RETRIES {
            let attempt_result =
                tokio::time::timeout(CONNECT_TIMEOUT, client.get_multiplexed_tokio_connection())
                    .await;
            match attempt_result {
                Ok(Ok(conn)) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                    })
                }
                Ok(Err(e)) => last_err = Some(e.to_string()),
                Err(_) => last_err = Some("connect timed out".to_string()),
            }
            if attempt + 1 < CONNECT_RETRIES {
                tokio::time::sleep(RETRY_BACKOFF_BASE * 2u32.pow(attempt)).await;
            }
        }
        Err(IngestError::Storage(format!(
            "redis connect failed after {CONNECT_RETRIES} attempts: {}",
            last_err.unwrap_or_default()
        )))
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn get(&self, key: &str) -> IngestResult<Option<Vec<u8>>> {
        let mut conn = self.conn.lock().await;
        conn.get(key)
            .await
            .map_err(|e| IngestError::Storage(e.to_string()))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> IngestResult<()> {
        let mut conn = self.conn.lock().await;
        conn.set::<_, _, ()>(key, value)
            .await
            .map_err(|e| IngestError::Storage(e.to_string()))
    }

    async fn delete(&self, key: &str) -> IngestResult<()> {
        let mut conn = self.conn.lock().await;
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| IngestError::Storage(e.to_string()))
    }

    async fn batch(&self, ops: Vec<BatchOp>) -> IngestResult<Vec<Option<Vec<u8>>>> {
        let mut conn = self.conn.lock().await;
        let mut pipe = redis::pipe();
        pipe.atomic();
        let mut get_count = 0;
        for op in &ops {
            match op {
                BatchOp::Set(k, v) => {
                    pipe.set(k, v).ignore();
                }
                BatchOp::Delete(k) => {
                    pipe.del(k).ignore();
                }
                BatchOp::Get(k) => {
                    pipe.get(k);
                    get_count += 1;
                }
            }
        }
        let values: Vec<Option<Vec<u8>>> = pipe
            .query_async(&mut *conn)
            .await
            .map_err(|e| IngestError::Storage(e.to_string()))?;
        debug_assert_eq!(values.len(), get_count);
        Ok(values)
    }

    async fn close(&self) -> IngestResult<()> {
        Ok(())
    }
}
