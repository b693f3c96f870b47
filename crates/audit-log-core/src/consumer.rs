//! The downstream log consumer interface and an in-memory test double.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::entry::AuditLogEntry;
use crate::error::IngestResult;

#[async_trait]
pub trait LogConsumer: Send + Sync {
    /// Deliver one entry downstream. An `Err` return counts as a failure
    /// against the circuit breaker; it does not itself retry.
    async fn consume(&self, entry: &AuditLogEntry) -> IngestResult<()>;
}

/// Test double that records every entry it was handed and can be scripted
/// to fail its first N calls before succeeding — drives the durable-retry
/// and breaker-opens/recovers integration scenarios.
pub struct ScriptedConsumer {
    state: Mutex<ScriptedState>,
}

struct ScriptedState {
    remaining_failures: u32,
    delivered: Vec<String>,
}

impl ScriptedConsumer {
    pub fn new(initial_failures: u32) -> Self {
        Self {
            state: Mutex::new(ScriptedState {
                remaining_failures: initial_failures,
                delivered: Vec::new(),
            }),
        }
    }

    pub fn always_succeeds() -> Self {
        Self::new(0)
    }

    pub async fn delivered_ids(&self) -> Vec<String> {
        self.state.lock().await.delivered.clone()
    }

    pub async fn delivered_count(&self) -> usize {
        self.state.lock().await.delivered.len()
    }
}

#[async_trait]
impl LogConsumer for ScriptedConsumer {
    async fn consume(&self, entry: &AuditLogEntry) -> IngestResult<()> {
        let mut state = self.state.lock().await;
        if state.remaining_failures > 0 {
            state.remaining_failures -= 1;
            return Err(crate::error::IngestError::Consumer(
                "scripted failure".to_string(),
            ));
        }
        state.delivered.push(entry.id.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ContentType;

    #[tokio::test]
    async fn always_succeeds_records_every_entry() {
        let consumer = ScriptedConsumer::always_succeeds();
        let entry = AuditLogEntry::new(ContentType::Json, vec![]);
        consumer.consume(&entry).await.unwrap();
        assert_eq!(consumer.delivered_count().await, 1);
    }

    #[tokio::test]
    async fn fails_n_times_then_succeeds() {
        let consumer = ScriptedConsumer::new(2);
        let entry = AuditLogEntry::new(ContentType::Json, vec![]);
        assert!(consumer.consume(&entry).await.is_err());
        assert!(consumer.consume(&entry).await.is_err());
        assert!(consumer.consume(&entry).await.is_ok());
        assert_eq!(consumer.delivered_count().await, 1);
    }
}
