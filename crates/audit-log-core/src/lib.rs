//! Core engine for the audit-log ingest receiver.
//!
//! Accepts audit-log payloads over HTTP, persists them atomically into a
//! pluggable [`KvStore`](kv::KvStore) before acknowledging, and hands them
//! to a downstream [`LogConsumer`](consumer::LogConsumer) with
//! circuit-breaker-protected retries via a background [`Reprocessor`](
//! reprocessor::Reprocessor). [`Receiver`](lifecycle::Receiver) ties the
//! pieces together into a single start/shutdown lifecycle.

pub mod breaker;
pub mod consumer;
pub mod entry;
pub mod error;
pub mod ingest;
pub mod key_index;
pub mod kv;
pub mod kv_file;
pub mod kv_sql;
#[cfg(feature = "redis-backend")]
pub mod kv_redis;
pub mod lifecycle;
pub mod otlp;
pub mod reprocessor;
pub mod server;

pub use breaker::{BreakerState, CircuitBreaker};
pub use consumer::{LogConsumer, ScriptedConsumer};
pub use entry::{AuditLogEntry, ContentType};
pub use error::{IngestError, IngestResult};
pub use key_index::KeyIndex;
pub use kv::{BatchOp, KvStore, MemoryKvStore};
pub use lifecycle::{BreakerConfig, Config, Receiver, StorageConfig};
