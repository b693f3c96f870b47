//! Audit log entry type and its on-disk/JSON codec.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{IngestError, IngestResult};

/// The content-types the ingest route accepts, normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    #[serde(rename = "application/x-protobuf")]
    Protobuf,
    #[serde(rename = "application/json")]
    Json,
}

impl ContentType {
    pub fn from_header(value: &str) -> Option<Self> {
        let value = value.split(';').next().unwrap_or(value).trim();
        match value {
            "application/x-protobuf" | "application/vnd.google.protobuf" => Some(Self::Protobuf),
            "application/json" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Protobuf => "application/x-protobuf",
            Self::Json => "application/json",
        }
    }
}

/// A single durably-persisted audit log record.
///
/// Stored as JSON at key `id` in the configured `KvStore`: the wire body is
/// always re-encoded to canonical protobuf before it is written, so the
/// reprocessor never has to re-sniff content-type on replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub content_type: ContentType,
    #[serde(with = "base64_bytes")]
    pub body: Vec<u8>,
}

impl AuditLogEntry {
    pub fn new(content_type: ContentType, body: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            content_type,
            body,
        }
    }

    pub fn to_bytes(&self) -> IngestResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> IngestResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| IngestError::Codec(format!("entry decode: {e}")))
    }
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(s.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
