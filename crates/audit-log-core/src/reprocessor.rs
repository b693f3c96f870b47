//! Background reprocessor: periodically retries delivery for entries that
//! are old enough to assume their original inline delivery attempt either
//! failed or was deferred by an open breaker.
//!
//! Same stop-flag shape as the HTTP accept loop, generalized from a
//! per-connection accept loop to a `tokio::time::interval` tick loop: a
//! shared `Arc<AtomicBool>` is checked every tick, and the in-flight work
//! for that tick is itself bounded so shutdown never waits past one
//! consumer call that is already hanging past its own timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::breaker::CircuitBreaker;
use crate::consumer::LogConsumer;
use crate::entry::AuditLogEntry;
use crate::ingest::attempt_delivery;
use crate::key_index::KeyIndex;
use crate::kv::KvStore;

/// Per-tick deadline for a single entry's redelivery attempt, independent
/// of the breaker's own cooldown — a consumer that hangs should not stall
/// the whole reprocessing tick.
const CONSUMER_CALL_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ReprocessorConfig {
    pub process_interval: Duration,
    pub process_age_threshold: chrono::Duration,
}

impl Default for ReprocessorConfig {
    fn default() -> Self {
        Self {
            process_interval: Duration::from_secs(30),
            process_age_threshold: chrono::Duration::seconds(30),
        }
    }
}

pub struct Reprocessor {
    store: Arc<dyn KvStore>,
    index: Arc<KeyIndex>,
    consumer: Arc<dyn LogConsumer>,
    breaker: Arc<CircuitBreaker>,
    config: ReprocessorConfig,
}

impl Reprocessor {
    pub fn new(
        store: Arc<dyn KvStore>,
        index: Arc<KeyIndex>,
        consumer: Arc<dyn LogConsumer>,
        breaker: Arc<CircuitBreaker>,
        config: ReprocessorConfig,
    ) -> Self {
        Self {
            store,
            index,
            consumer,
            breaker,
            config,
        }
    }

    /// Run one reprocessing pass: list indexed keys, fetch each entry, and
    /// attempt redelivery for any entry older than `process_age_threshold`.
    /// Ghost keys (index entries with no blob) are reconciled by removing
    /// them from the index.
    pub async fn run_once(&self) {
        let keys = match self.index.list().await {
            Ok(keys) => keys,
            Err(e) => {
                log::warn!("reprocessor: failed to list key index: {e}");
                return;
            }
        };

        let now = Utc::now();
        for key in keys {
            let blob = match self.store.get(&key).await {
                Ok(Some(blob)) => blob,
                Ok(None) => {
                    log::info!("reprocessor: reconciling ghost key {}", &key[..key.len().min(8)]);
                    if let Err(e) = self.index.remove(&key).await {
                        log::warn!("reprocessor: failed to drop ghost key {key}: {e}");
                    }
                    continue;
                }
                Err(e) => {
                    log::warn!("reprocessor: failed to read entry {key}: {e}");
                    continue;
                }
            };

            let entry = match AuditLogEntry::from_bytes(&blob) {
                Ok(entry) => entry,
                Err(e) => {
                    log::error!("reprocessor: entry {key} failed to decode, skipping: {e}");
                    continue;
                }
            };

            let age = now.signed_duration_since(entry.timestamp);
            if age < self.config.process_age_threshold {
                continue;
            }

            let call = attempt_delivery(&self.store, &self.index, &self.consumer, &self.breaker, &entry);
            if tokio::time::timeout(CONSUMER_CALL_TIMEOUT, call).await.is_err() {
                log::warn!("reprocessor: delivery attempt for entry {} timed out", &entry.id[..8]);
            }
        }
    }

    /// Run the tick loop until `stop` is set. Ticks that fire after `stop`
    /// was already observed are skipped rather than awaited.
    pub async fn run(self: Arc<Self>, stop: Arc<AtomicBool>) {
        let mut interval = tokio::time::interval(self.config.process_interval);
        loop {
            interval.tick().await;
            if stop.load(Ordering::Relaxed) {
                return;
            }
            self.run_once().await;
        }
    }
}
