//! Receiver configuration and lifecycle.
//!
//! `Receiver::start`/`shutdown` replace the source system's host-managed
//! `Start`/`Shutdown` extension trait methods with a plain async
//! constructor/destructor pair: this crate has no plugin/factory host to
//! resolve a storage backend through, so `Config` names one directly and
//! `Receiver::start` builds it.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::breaker::CircuitBreaker;
use crate::consumer::LogConsumer;
use crate::error::{IngestError, IngestResult};
use crate::key_index::KeyIndex;
use crate::kv::KvStore;
use crate::kv_file::FileKvStore;
use crate::kv_sql::SqlKvStore;
use crate::reprocessor::{Reprocessor, ReprocessorConfig};
use crate::server::{run_server, IngestHandlers};

/// Which concrete `KvStore` backend to construct.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageConfig {
    Memory,
    File { base_dir: String },
    Sql { path: String },
    #[cfg(feature = "redis-backend")]
    Redis { url: String },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Memory
    }
}

fn default_endpoint() -> String {
    "127.0.0.1:4318".to_string()
}

fn default_process_interval_secs() -> u64 {
    30
}

fn default_process_age_threshold_secs() -> i64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_open_duration_secs")]
    pub open_duration_secs: u64,
    #[serde(default = "default_breaker_enabled")]
    pub enabled: bool,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_open_duration_secs() -> u64 {
    60
}

fn default_breaker_enabled() -> bool {
    true
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            open_duration_secs: default_open_duration_secs(),
            enabled: default_breaker_enabled(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default = "default_process_interval_secs")]
    pub process_interval_secs: u64,
    #[serde(default = "default_process_age_threshold_secs")]
    pub process_age_threshold_secs: i64,
    #[serde(default)]
    pub circuit_breaker: BreakerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            storage: StorageConfig::default(),
            process_interval_secs: default_process_interval_secs(),
            process_age_threshold_secs: default_process_age_threshold_secs(),
            circuit_breaker: BreakerConfig::default(),
        }
    }
}

async fn build_store(storage: &StorageConfig) -> IngestResult<Arc<dyn KvStore>> {
    match storage {
        StorageConfig::Memory => Ok(Arc::new(crate::kv::MemoryKvStore::new())),
        StorageConfig::File { base_dir } => {
            Ok(Arc::new(FileKvStore::open(base_dir).await?))
        }
        StorageConfig::Sql { path } => Ok(Arc::new(SqlKvStore::open(path)?)),
        #[cfg(feature = "redis-backend")]
        StorageConfig::Redis { url } => Ok(Arc::new(crate::kv_redis::RedisKvStore::connect(url).await?)),
    }
}

/// A running receiver: bound listener task plus reprocessor task, both
/// cooperatively stopped by `shutdown`.
pub struct Receiver {
    store: Arc<dyn KvStore>,
    stop: Arc<AtomicBool>,
    server_task: JoinHandle<()>,
    reprocessor_task: JoinHandle<()>,
}

impl Receiver {
    /// Bind the listener, spawn the reprocessor, and return once the
    /// receiver is accepting connections.
    pub async fn start(config: Config, consumer: Arc<dyn LogConsumer>) -> IngestResult<Self> {
        let store = build_store(&config.storage).await?;
        let index = Arc::new(KeyIndex::new(store.clone()));
        let breaker = Arc::new(CircuitBreaker::new_with_enabled(
            config.circuit_breaker.failure_threshold,
            Duration::from_secs(config.circuit_breaker.open_duration_secs),
            config.circuit_breaker.enabled,
        ));

        let listener = TcpListener::bind(&config.endpoint)
            .await
            .map_err(|e| IngestError::Config(format!("bind {}: {e}", config.endpoint)))?;
        log::info!("audit-log-receiver listening on {}", config.endpoint);

        let stop = Arc::new(AtomicBool::new(false));

        let handlers = IngestHandlers {
            store: store.clone(),
            index: index.clone(),
            consumer: consumer.clone(),
            breaker: breaker.clone(),
        };
        let server_stop = stop.clone();
        let server_task = tokio::spawn(async move {
            if let Err(e) = run_server(listener, handlers, server_stop).await {
                log::error!("server loop exited with error: {e}");
            }
        });

        let reprocessor = Arc::new(Reprocessor::new(
            store.clone(),
            index,
            consumer,
            breaker,
            ReprocessorConfig {
                process_interval: Duration::from_secs(config.process_interval_secs),
                process_age_threshold: chrono::Duration::seconds(config.process_age_threshold_secs),
            },
        ));
        let reprocessor_stop = stop.clone();
        let reprocessor_task = tokio::spawn(async move {
            reprocessor.run(reprocessor_stop).await;
        });

        Ok(Self {
            store,
            stop,
            server_task,
            reprocessor_task,
        })
    }

    /// Stop accepting new work and wait (up to `deadline`) for the server
    /// and reprocessor tasks to finish, then close the storage backend.
    pub async fn shutdown(self, deadline: Duration) -> IngestResult<()> {
        self.stop.store(true, Ordering::Relaxed);

        let drain = async {
            let _ = self.server_task.await;
            let _ = self.reprocessor_task.await;
        };
        if tokio::time::timeout(deadline, drain).await.is_err() {
            log::warn!("shutdown deadline elapsed before tasks drained");
        }

        self.store.close().await
    }
}
