//! Ingest request handling: decode → persist → attempt delivery → respond.
//!
//! Persistence happens before delivery is ever attempted, and the response
//! depends only on persistence succeeding: once an entry is durably
//! indexed, a failed or breaker-rejected delivery attempt is the
//! reprocessor's problem, not the caller's.

use std::sync::Arc;

use prost::Message as _;

use crate::breaker::CircuitBreaker;
use crate::consumer::LogConsumer;
use crate::entry::{AuditLogEntry, ContentType};
use crate::error::{IngestError, IngestResult};
use crate::key_index::KeyIndex;
use crate::kv::KvStore;
use crate::otlp;

pub struct IngestOutcome {
    pub entry_id: String,
    pub record_count: usize,
    pub response_body: Vec<u8>,
    pub response_content_type: &'static str,
}

/// Decode the wire body per its content-type and normalize it to the
/// canonical protobuf-encoded form for storage, returning the record count
/// the response needs.
fn normalize_body(content_type: ContentType, body: &[u8]) -> IngestResult<(Vec<u8>, usize)> {
    match content_type {
        ContentType::Protobuf => {
            let decoded = otlp::ExportLogsServiceRequest::decode_protobuf(body)
                .map_err(|e| IngestError::BadPayload(format!("invalid OTLP protobuf: {e}")))?;
            let count = decoded.record_count();
            Ok((decoded.encode_protobuf(), count))
        }
        ContentType::Json => {
            let decoded = otlp::decode_json(body)
                .map_err(|e| IngestError::BadPayload(format!("invalid OTLP JSON: {e}")))?;
            let count = decoded.record_count();
            Ok((decoded.encode_protobuf(), count))
        }
    }
}

fn empty_response(content_type: ContentType) -> (Vec<u8>, &'static str) {
    match content_type {
        ContentType::Protobuf => (
            otlp::ExportLogsServiceResponse::empty().encode_to_vec(),
            "application/x-protobuf",
        ),
        ContentType::Json => (otlp::empty_json_response(), "application/json"),
    }
}

pub async fn handle_ingest(
    store: &Arc<dyn KvStore>,
    index: &KeyIndex,
    consumer: &Arc<dyn LogConsumer>,
    breaker: &CircuitBreaker,
    content_type: ContentType,
    body: &[u8],
) -> IngestResult<IngestOutcome> {
    let (normalized_body, record_count) = normalize_body(content_type, body)?;
    let (response_body, response_content_type) = empty_response(content_type);

    if record_count == 0 {
        // Nothing to persist or deliver; acknowledge with the canonical
        // empty body without touching the store or the consumer.
        return Ok(IngestOutcome {
            entry_id: String::new(),
            record_count,
            response_body,
            response_content_type,
        });
    }

    let entry = AuditLogEntry::new(content_type, normalized_body);
    let entry_bytes = entry.to_bytes()?;

    index
        .add_entry_atomically(&entry.id, entry_bytes)
        .await
        .map_err(|e| IngestError::Storage(format!("persist entry {}: {e}", entry.id)))?;

    log::info!("ingested entry {} ({} records)", &entry.id[..8], record_count);

    attempt_delivery(store, index, consumer, breaker, &entry).await;

    Ok(IngestOutcome {
        entry_id: entry.id,
        record_count,
        response_body,
        response_content_type,
    })
}

/// Try to deliver `entry` right now if the breaker allows it. Success
/// removes the entry from the index; failure or a closed breaker leaves it
/// in place for the reprocessor to pick up later.
pub async fn attempt_delivery(
    _store: &Arc<dyn KvStore>,
    index: &KeyIndex,
    consumer: &Arc<dyn LogConsumer>,
    breaker: &CircuitBreaker,
    entry: &AuditLogEntry,
) {
    if !breaker.allow() {
        log::debug!("breaker open, deferring entry {}", &entry.id[..8]);
        return;
    }

    match consumer.consume(entry).await {
        Ok(()) => {
            breaker.record_success();
            if let Err(e) = index.delete_entry_and_index(&entry.id).await {
                log::warn!("delivered entry {} but failed to clear it: {e}", &entry.id[..8]);
            }
        }
        Err(e) => {
            breaker.record_failure();
            log::warn!("delivery failed for entry {}: {e}", &entry.id[..8]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::ScriptedConsumer;
    use crate::kv::MemoryKvStore;
    use std::time::Duration;

    fn setup() -> (Arc<dyn KvStore>, KeyIndex, CircuitBreaker) {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let index = KeyIndex::new(store.clone());
        let breaker = CircuitBreaker::new(5, Duration::from_secs(60));
        (store, index, breaker)
    }

    #[tokio::test]
    async fn zero_record_batch_is_acknowledged_without_persisting_or_delivering() {
        let (store, index, breaker) = setup();
        let consumer: Arc<dyn LogConsumer> = Arc::new(ScriptedConsumer::always_succeeds());
        let body = br#"{"resourceLogs":[]}"#;
        let outcome = handle_ingest(&store, &index, &consumer, &breaker, ContentType::Json, body)
            .await
            .unwrap();
        assert_eq!(outcome.record_count, 0);
        assert_eq!(outcome.response_body, otlp::empty_json_response());
        assert_eq!(index.list().await.unwrap(), Vec::<String>::new());
        assert_eq!(consumer.delivered_count().await, 0);
    }

    #[tokio::test]
    async fn json_ingest_persists_then_delivers_successfully() {
        let (store, index, breaker) = setup();
        let consumer = Arc::new(ScriptedConsumer::always_succeeds());
        let consumer_trait: Arc<dyn LogConsumer> = consumer.clone();
        let body = br#"{"resourceLogs":[{"scopeLogs":[{"logRecords":[{"body":{"stringValue":"hi"}}]}]}]}"#;
        let outcome = handle_ingest(&store, &index, &consumer_trait, &breaker, ContentType::Json, body)
            .await
            .unwrap();
        assert_eq!(outcome.record_count, 1);
        assert_eq!(consumer.delivered_count().await, 1);
        // Delivery succeeded so the entry should have been cleared from the index.
        assert_eq!(index.list().await.unwrap(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn failed_delivery_leaves_entry_durably_indexed() {
        let (store, index, breaker) = setup();
        let consumer: Arc<dyn LogConsumer> = Arc::new(ScriptedConsumer::new(10));
        let body = br#"{"resourceLogs":[{"scopeLogs":[{"logRecords":[{"body":{"stringValue":"hi"}}]}]}]}"#;
        let outcome = handle_ingest(&store, &index, &consumer, &breaker, ContentType::Json, body)
            .await
            .unwrap();
        let keys = index.list().await.unwrap();
        assert_eq!(keys, vec![outcome.entry_id.clone()]);
        assert!(store.get(&outcome.entry_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn malformed_json_body_is_bad_payload() {
        let (store, index, breaker) = setup();
        let consumer: Arc<dyn LogConsumer> = Arc::new(ScriptedConsumer::always_succeeds());
        let err = handle_ingest(&store, &index, &consumer, &breaker, ContentType::Json, b"not json")
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::BadPayload(_)));
        assert_eq!(index.list().await.unwrap(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn breaker_open_defers_delivery_without_failing_ingest() {
        let (store, index, breaker) = setup();
        // Trip the breaker before ingest so delivery is skipped outright.
        for _ in 0..5 {
            breaker.record_failure();
        }
        let consumer: Arc<dyn LogConsumer> = Arc::new(ScriptedConsumer::always_succeeds());
        let body = br#"{"resourceLogs":[{"scopeLogs":[{"logRecords":[{"body":{"stringValue":"x"}}]}]}]}"#;
        let outcome = handle_ingest(&store, &index, &consumer, &breaker, ContentType::Json, body)
            .await
            .unwrap();
        assert_eq!(index.list().await.unwrap(), vec![outcome.entry_id]);
    }
}
