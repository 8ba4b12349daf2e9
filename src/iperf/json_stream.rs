//! iperf3 `--json-stream` records
//!
//! Each output line in JSON-stream mode is one object of the form
//! `{"event": "<name>", "data": {...}}`. Payload layouts differ between iperf3
//! releases, so the payload is kept as a loose [`serde_json::Value`] and probed
//! field by field instead of being bound to a fixed schema.

use serde::Deserialize;
use serde_json::Value;

/// One decoded JSON-stream line
#[derive(Debug, Clone, PartialEq)]
pub enum StreamRecord {
    /// Periodic report for the last reporting interval
    Interval(Value),
    /// Final summary once the test completes
    End(Value),
    /// Fatal error reported by iperf3
    Error(Value),
    /// Text relayed from the server side (`--get-server-output`)
    ServerOutputText(Value),
    /// `start` and any event name this relay does not act on
    Other(String),
    /// A JSON object without an `event` field
    Untagged,
}

#[derive(Deserialize)]
struct RawRecord {
    event: Option<String>,
    #[serde(default)]
    data: Value,
}

/// Parses one line as a JSON-stream record
///
/// Returns `None` when the line is not a JSON object; such lines belong to the
/// legacy human-readable protocol.
pub fn parse_record(line: &str) -> Option<StreamRecord> {
    let value: Value = serde_json::from_str(line).ok()?;
    if !value.is_object() {
        return None;
    }
    let raw: RawRecord = serde_json::from_value(value).ok()?;

    let record = match raw.event.as_deref() {
        Some("interval") => StreamRecord::Interval(raw.data),
        Some("end") => StreamRecord::End(raw.data),
        Some("error") => StreamRecord::Error(raw.data),
        Some("server_output_text") => StreamRecord::ServerOutputText(raw.data),
        Some(other) => StreamRecord::Other(other.to_string()),
        None => StreamRecord::Untagged,
    };
    Some(record)
}

fn bits_per_second(value: Option<&Value>) -> Option<f64> {
    value?.as_object()?.get("bits_per_second")?.as_f64()
}

/// Extracts the aggregate throughput of an `interval` or `end` payload
///
/// Preference order: `sum_received`, `sum`, `sum_sent`, then the per-stream
/// figures (summed when there are several, taken as is when there is one).
pub fn extract_bits_per_second(data: &Value) -> Option<f64> {
    if !data.is_object() {
        return None;
    }

    for key in ["sum_received", "sum", "sum_sent"] {
        if let Some(bps) = bits_per_second(data.get(key)) {
            return Some(bps);
        }
    }

    let streams = data.get("streams")?.as_array()?;
    let values: Vec<f64> = streams
        .iter()
        .filter_map(|stream| bits_per_second(Some(stream)))
        .collect();

    match values.as_slice() {
        [] => None,
        [single] => Some(*single),
        many => Some(many.iter().sum()),
    }
}

/// Renders an `error` or `server_output_text` payload as plain text
pub fn payload_text(data: &Value) -> String {
    match data {
        Value::String(text) => text.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
