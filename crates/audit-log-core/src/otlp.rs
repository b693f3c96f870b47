//! OTLP logs wire types — `opentelemetry-proto`'s `logs/v1` + `common/v1`
//! messages, trimmed to the fields this receiver reads or writes.
//!
//! Hand-maintained in the style of a checked-in `prost-build` output file
//! (no `build.rs`/`protoc` step here) — field numbers match the public
//! `opentelemetry-proto` schema so payloads produced by a real OTLP exporter
//! decode correctly.

use prost::Message;
use serde::{Deserialize, Serialize};

#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Debug, Clone, PartialEq, Message)]
pub struct ExportLogsServiceRequest {
    #[prost(message, repeated, tag = "1")]
    pub resource_logs: Vec<ResourceLogs>,
}

#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Debug, Clone, PartialEq, Message)]
pub struct ExportLogsServiceResponse {
    #[prost(message, optional, tag = "1")]
    pub partial_success: Option<ExportLogsPartialSuccess>,
}

#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Debug, Clone, PartialEq, Message)]
pub struct ExportLogsPartialSuccess {
    #[prost(int64, tag = "1")]
    pub rejected_log_records: i64,
    #[prost(string, tag = "2")]
    pub error_message: String,
}

#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Debug, Clone, PartialEq, Message)]
pub struct ResourceLogs {
    #[prost(message, optional, tag = "1")]
    pub resource: Option<Resource>,
    #[prost(message, repeated, tag = "2")]
    pub scope_logs: Vec<ScopeLogs>,
    #[prost(string, tag = "3")]
    pub schema_url: String,
}

#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Debug, Clone, PartialEq, Message)]
pub struct ScopeLogs {
    #[prost(message, optional, tag = "1")]
    pub scope: Option<InstrumentationScope>,
    #[prost(message, repeated, tag = "2")]
    pub log_records: Vec<LogRecord>,
    #[prost(string, tag = "3")]
    pub schema_url: String,
}

#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Debug, Clone, PartialEq, Message)]
pub struct LogRecord {
    #[prost(fixed64, tag = "1")]
    pub time_unix_nano: u64,
    #[prost(fixed64, tag = "11")]
    pub observed_time_unix_nano: u64,
    #[prost(int32, tag = "2")]
    pub severity_number: i32,
    #[prost(string, tag = "3")]
    pub severity_text: String,
    #[prost(message, optional, tag = "5")]
    pub body: Option<AnyValue>,
    #[prost(message, repeated, tag = "6")]
    pub attributes: Vec<KeyValue>,
    #[prost(uint32, tag = "7")]
    pub dropped_attributes_count: u32,
    #[prost(fixed32, tag = "8")]
    pub flags: u32,
    #[prost(bytes = "vec", tag = "9")]
    pub trace_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "10")]
    pub span_id: Vec<u8>,
}

#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Debug, Clone, PartialEq, Message)]
pub struct Resource {
    #[prost(message, repeated, tag = "1")]
    pub attributes: Vec<KeyValue>,
    #[prost(uint32, tag = "2")]
    pub dropped_attributes_count: u32,
}

#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Debug, Clone, PartialEq, Message)]
pub struct InstrumentationScope {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub version: String,
    #[prost(message, repeated, tag = "3")]
    pub attributes: Vec<KeyValue>,
    #[prost(uint32, tag = "4")]
    pub dropped_attributes_count: u32,
}

#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Debug, Clone, PartialEq, Message)]
pub struct KeyValue {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(message, optional, tag = "2")]
    pub value: Option<AnyValue>,
}

#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Debug, Clone, PartialEq, Message)]
pub struct ArrayValue {
    #[prost(message, repeated, tag = "1")]
    pub values: Vec<AnyValue>,
}

#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Debug, Clone, PartialEq, Message)]
pub struct KeyValueList {
    #[prost(message, repeated, tag = "1")]
    pub values: Vec<KeyValue>,
}

#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Debug, Clone, PartialEq, Message)]
pub struct AnyValue {
    #[prost(oneof = "any_value::Value", tags = "1, 2, 3, 4, 5, 6, 7")]
    pub value: Option<any_value::Value>,
}

pub mod any_value {
    use super::{ArrayValue, KeyValueList};

    #[allow(clippy::derive_partial_eq_without_eq)]
    #[derive(Debug, Clone, PartialEq, ::prost::Oneof)]
    pub enum Value {
        #[prost(string, tag = "1")]
        StringValue(String),
        #[prost(bool, tag = "2")]
        BoolValue(bool),
        #[prost(int64, tag = "3")]
        IntValue(i64),
        #[prost(double, tag = "4")]
        DoubleValue(f64),
        #[prost(message, tag = "5")]
        ArrayValue(ArrayValue),
        #[prost(message, tag = "6")]
        KvlistValue(KeyValueList),
        #[prost(bytes, tag = "7")]
        BytesValue(Vec<u8>),
    }
}

impl ExportLogsServiceRequest {
    /// Total number of `LogRecord`s across every resource/scope in this batch.
    pub fn record_count(&self) -> usize {
        self.resource_logs
            .iter()
            .flat_map(|rl| rl.scope_logs.iter())
            .map(|sl| sl.log_records.len())
            .sum()
    }

    pub fn decode_protobuf(bytes: &[u8]) -> Result<Self, prost::DecodeError> {
        Self::decode(bytes)
    }

    pub fn encode_protobuf(&self) -> Vec<u8> {
        self.encode_to_vec()
    }
}

impl ExportLogsServiceResponse {
    /// The canonical empty response body both success paths return.
    pub fn empty() -> Self {
        Self { partial_success: None }
    }
}

// ── JSON shadow (OTLP's canonical JSON mapping, scoped to the fields this
// receiver actually reads/writes — see DESIGN.md for the fields left out) ──

#[derive(Debug, Default, Serialize, Deserialize)]
struct JsonLogsRequest {
    #[serde(rename = "resourceLogs", default)]
    resource_logs: Vec<JsonResourceLogs>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JsonResourceLogs {
    #[serde(default)]
    resource: Option<JsonResource>,
    #[serde(rename = "scopeLogs", default)]
    scope_logs: Vec<JsonScopeLogs>,
    #[serde(rename = "schemaUrl", default)]
    schema_url: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JsonResource {
    #[serde(default)]
    attributes: Vec<JsonKeyValue>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JsonScopeLogs {
    #[serde(default)]
    scope: Option<JsonScope>,
    #[serde(rename = "logRecords", default)]
    log_records: Vec<JsonLogRecord>,
    #[serde(rename = "schemaUrl", default)]
    schema_url: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JsonScope {
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JsonKeyValue {
    key: String,
    #[serde(default)]
    value: Option<JsonAnyValue>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JsonAnyValue {
    #[serde(rename = "stringValue", skip_serializing_if = "Option::is_none")]
    string_value: Option<String>,
    #[serde(rename = "boolValue", skip_serializing_if = "Option::is_none")]
    bool_value: Option<bool>,
    #[serde(rename = "intValue", skip_serializing_if = "Option::is_none")]
    int_value: Option<String>,
    #[serde(rename = "doubleValue", skip_serializing_if = "Option::is_none")]
    double_value: Option<f64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JsonLogRecord {
    #[serde(rename = "timeUnixNano", default)]
    time_unix_nano: String,
    #[serde(rename = "observedTimeUnixNano", default)]
    observed_time_unix_nano: String,
    #[serde(rename = "severityNumber", default)]
    severity_number: i32,
    #[serde(rename = "severityText", default)]
    severity_text: String,
    #[serde(default)]
    body: Option<JsonAnyValue>,
    #[serde(default)]
    attributes: Vec<JsonKeyValue>,
}

fn json_any_to_proto(v: JsonAnyValue) -> Option<AnyValue> {
    let inner = if let Some(s) = v.string_value {
        any_value::Value::StringValue(s)
    } else if let Some(b) = v.bool_value {
        any_value::Value::BoolValue(b)
    } else if let Some(i) = v.int_value {
        any_value::Value::IntValue(i.parse().unwrap_or_default())
    } else if let Some(d) = v.double_value {
        any_value::Value::DoubleValue(d)
    } else {
        return None;
    };
    Some(AnyValue { value: Some(inner) })
}

fn json_kv_to_proto(kv: JsonKeyValue) -> KeyValue {
    KeyValue {
        key: kv.key,
        value: kv.value.and_then(json_any_to_proto),
    }
}

#[cfg(test)]
fn proto_any_to_json(v: &AnyValue) -> JsonAnyValue {
    let mut out = JsonAnyValue::default();
    match &v.value {
        Some(any_value::Value::StringValue(s)) => out.string_value = Some(s.clone()),
        Some(any_value::Value::BoolValue(b)) => out.bool_value = Some(*b),
        Some(any_value::Value::IntValue(i)) => out.int_value = Some(i.to_string()),
        Some(any_value::Value::DoubleValue(d)) => out.double_value = Some(*d),
        _ => {}
    }
    out
}

#[cfg(test)]
fn proto_kv_to_json(kv: &KeyValue) -> JsonKeyValue {
    JsonKeyValue {
        key: kv.key.clone(),
        value: kv.value.as_ref().map(proto_any_to_json),
    }
}

/// Decode OTLP-logs JSON into the canonical protobuf request form.
pub fn decode_json(bytes: &[u8]) -> Result<ExportLogsServiceRequest, serde_json::Error> {
    let parsed: JsonLogsRequest = serde_json::from_slice(bytes)?;
    let resource_logs = parsed
        .resource_logs
        .into_iter()
        .map(|rl| ResourceLogs {
            resource: rl.resource.map(|r| Resource {
                attributes: r.attributes.into_iter().map(json_kv_to_proto).collect(),
                dropped_attributes_count: 0,
            }),
            scope_logs: rl
                .scope_logs
                .into_iter()
                .map(|sl| ScopeLogs {
                    scope: sl.scope.map(|s| InstrumentationScope {
                        name: s.name,
                        version: s.version,
                        attributes: Vec::new(),
                        dropped_attributes_count: 0,
                    }),
                    log_records: sl
                        .log_records
                        .into_iter()
                        .map(|lr| LogRecord {
                            time_unix_nano: lr.time_unix_nano.parse().unwrap_or_default(),
                            observed_time_unix_nano: lr
                                .observed_time_unix_nano
                                .parse()
                                .unwrap_or_default(),
                            severity_number: lr.severity_number,
                            severity_text: lr.severity_text,
                            body: lr.body.and_then(json_any_to_proto),
                            attributes: lr.attributes.into_iter().map(json_kv_to_proto).collect(),
                            dropped_attributes_count: 0,
                            flags: 0,
                            trace_id: Vec::new(),
                            span_id: Vec::new(),
                        })
                        .collect(),
                    schema_url: sl.schema_url,
                })
                .collect(),
            schema_url: rl.schema_url,
        })
        .collect();
    Ok(ExportLogsServiceRequest { resource_logs })
}

/// The canonical empty OTLP JSON export response body.
pub fn empty_json_response() -> Vec<u8> {
    b"{}".to_vec()
}
