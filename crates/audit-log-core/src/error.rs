// Single canonical error enum for the ingest engine, built with `thiserror`.
//
// Design rules:
//   • Variants are coarse-grained by domain (payload, codec, storage, consumer…).
//   • `From` impls wire std/external error conversions automatically.
//   • `status_code()` maps each variant to its ingest-path HTTP response, so
//     the one piece of HTTP-awareness the error type needs stays contained.
//   • No variant carries payload bytes or raw consumer/storage detail that
//     might contain sensitive record content.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Malformed body, unknown content-type, or a decode failure on the
    /// receiver side. Permanent — the client resubmitting unchanged will
    /// never succeed.
    #[error("bad payload: {0}")]
    BadPayload(String),

    /// `Content-Type` header was not one of the three accepted values.
    #[error("unsupported content-type: {0}")]
    UnsupportedContentType(String),

    /// Request verb other than POST hit the ingest routes.
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    /// Entry serialization/deserialization failure (JSON envelope or base64 body).
    #[error("codec error: {0}")]
    Codec(String),

    /// Missing or wrong-type storage configuration — fatal at start.
    #[error("configuration error: {0}")]
    Config(String),

    /// KV get/set/delete/batch failure. Transient; surfaces as 500 on
    /// ingest, logged-and-skipped in the reprocessor.
    #[error("storage error: {0}")]
    Storage(String),

    /// Downstream consumer delivery failure. Transient; counted by the
    /// circuit breaker.
    #[error("consumer error: {0}")]
    Consumer(String),

    /// The circuit breaker is open — not itself a failure, but callers
    /// that need to distinguish "rejected" from "attempted and failed"
    /// match on this variant.
    #[error("circuit breaker open")]
    BreakerOpen,

    /// Catch-all for errors that do not yet have a dedicated variant.
    /// Prefer adding a specific variant over using this in new code.
    #[error("{0}")]
    Other(String),
}

impl IngestError {
    /// HTTP status this error maps to on the ingest path.
    pub fn status_code(&self) -> u16 {
        match self {
            IngestError::BadPayload(_)
            | IngestError::UnsupportedContentType(_)
            | IngestError::Codec(_) => 400,
            IngestError::MethodNotAllowed(_) => 405,
            IngestError::BreakerOpen => 503,
            IngestError::Config(_)
            | IngestError::Storage(_)
            | IngestError::Consumer(_)
            | IngestError::Other(_) => 500,
        }
    }
}

impl From<std::io::Error> for IngestError {
    fn from(e: std::io::Error) -> Self {
        IngestError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(e: serde_json::Error) -> Self {
        IngestError::Codec(e.to_string())
    }
}

pub type IngestResult<T> = Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_spec_table() {
        assert_eq!(IngestError::BadPayload("x".into()).status_code(), 400);
        assert_eq!(IngestError::UnsupportedContentType("x".into()).status_code(), 400);
        assert_eq!(IngestError::Codec("x".into()).status_code(), 400);
        assert_eq!(IngestError::MethodNotAllowed("GET".into()).status_code(), 405);
        assert_eq!(IngestError::BreakerOpen.status_code(), 503);
        assert_eq!(IngestError::Storage("x".into()).status_code(), 500);
        assert_eq!(IngestError::Consumer("x".into()).status_code(), 500);
        assert_eq!(IngestError::Config("x".into()).status_code(), 500);
    }

    #[test]
    fn io_error_maps_to_storage() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err: IngestError = io_err.into();
        assert!(matches!(err, IngestError::Storage(_)));
    }
}
