// SPDX-License-Identifier: Apache-2.0

//! Sparkplug B protobuf payload codec for topics under `spBv1.0/` (§6).
//!
//! This mirrors `mqttea`'s own `prost` + `prost-build` usage: a `.proto`
//! schema compiled at build time, wrapped here with JSON conversion so the
//! rest of the hub (store, broadcast, transform sandbox) only ever has to
//! deal in canonical JSON, never in `prost`-generated structs.

use prost::Message;
use serde_json::{Map, Value, json};

include!(concat!(env!("OUT_DIR"), "/uns.sparkplug.rs"));

#[derive(thiserror::Error, Debug)]
pub enum SparkplugError {
    #[error("sparkplug protobuf decode failed: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("sparkplug protobuf encode failed: {0}")]
    Encode(#[from] prost::EncodeError),
    #[error("metric value could not be represented as JSON")]
    UnsupportedValue,
}

/// Decode raw Sparkplug B protobuf bytes into canonical JSON, applying the
/// same large-integer canonicalization (§4.2 step 4) every other decode
/// path applies.
pub fn decode(bytes: &[u8]) -> Result<Value, SparkplugError> {
    let decoded = Payload::decode(bytes)?;
    let mut metrics = Vec::with_capacity(decoded.metrics.len());
    for metric in &decoded.metrics {
        metrics.push(metric_to_json(metric));
    }
    let mut value = json!({
        "timestamp": decoded.timestamp,
        "seq": decoded.seq,
        "metrics": metrics,
    });
    uns_model::canon::canonicalize_large_ints(&mut value);
    Ok(value)
}

/// Re-encode a JSON value (typically one a transform target produced) back
/// into Sparkplug B protobuf bytes, for the round-trip case in §4.4/§8.8.
pub fn encode(value: &Value) -> Result<Vec<u8>, SparkplugError> {
    let obj = value.as_object().ok_or(SparkplugError::UnsupportedValue)?;
    let timestamp = obj.get("timestamp").and_then(Value::as_u64);
    let seq = obj.get("seq").and_then(Value::as_u64);
    let metrics = obj
        .get("metrics")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(json_to_metric).collect::<Result<_, _>>())
        .transpose()?
        .unwrap_or_default();

    let payload = Payload {
        timestamp,
        seq,
        metrics,
    };
    let mut buf = Vec::with_capacity(payload.encoded_len());
    payload.encode(&mut buf)?;
    Ok(buf)
}

fn metric_to_json(metric: &payload::Metric) -> Value {
    let mut map = Map::new();
    if let Some(name) = &metric.name {
        map.insert("name".into(), json!(name));
    }
    if let Some(alias) = metric.alias {
        map.insert("alias".into(), json!(alias));
    }
    if let Some(timestamp) = metric.timestamp {
        map.insert("timestamp".into(), json!(timestamp));
    }
    if let Some(datatype) = metric.datatype {
        map.insert("datatype".into(), json!(datatype));
    }
    if metric.is_null.unwrap_or(false) {
        map.insert("value".into(), Value::Null);
    } else if let Some(value) = &metric.value {
        map.insert("value".into(), metric_value_to_json(value));
    }
    Value::Object(map)
}

fn metric_value_to_json(value: &payload::metric::Value) -> Value {
    use payload::metric::Value as MetricValue;
    match value {
        MetricValue::IntValue(v) => json!(v),
        MetricValue::LongValue(v) => json!(v),
        MetricValue::FloatValue(v) => json!(v),
        MetricValue::DoubleValue(v) => json!(v),
        MetricValue::BooleanValue(v) => json!(v),
        MetricValue::StringValue(v) => json!(v),
        MetricValue::BytesValue(v) => json!(hex::encode_bytes(v)),
    }
}

fn json_to_metric(value: &Value) -> Result<payload::Metric, SparkplugError> {
    let obj = value.as_object().ok_or(SparkplugError::UnsupportedValue)?;
    let name = obj.get("name").and_then(Value::as_str).map(String::from);
    let alias = obj.get("alias").and_then(Value::as_u64);
    let timestamp = obj.get("timestamp").and_then(Value::as_u64);
    let datatype = obj
        .get("datatype")
        .and_then(Value::as_u64)
        .map(|d| d as u32);
    let raw_value = obj.get("value");
    let is_null = matches!(raw_value, Some(Value::Null));

    let metric_value = match raw_value {
        None | Some(Value::Null) => None,
        Some(Value::Bool(b)) => Some(payload::metric::Value::BooleanValue(*b)),
        Some(Value::String(s)) => Some(payload::metric::Value::StringValue(s.clone())),
        Some(Value::Number(n)) if n.is_f64() => {
            Some(payload::metric::Value::DoubleValue(n.as_f64().unwrap()))
        }
        Some(Value::Number(n)) if n.as_i64().is_some_and(|v| v >= 0) && n.as_u64().unwrap() <= u32::MAX as u64 => {
            Some(payload::metric::Value::IntValue(n.as_u64().unwrap() as u32))
        }
        Some(Value::Number(n)) => {
            Some(payload::metric::Value::LongValue(n.as_u64().ok_or(
                SparkplugError::UnsupportedValue,
            )?))
        }
        Some(_) => return Err(SparkplugError::UnsupportedValue),
    };

    Ok(payload::Metric {
        name,
        alias,
        timestamp,
        datatype,
        is_null: if is_null { Some(true) } else { None },
        value: metric_value,
    })
}

/// Minimal hex encoding so `bytes_value` metrics survive a JSON round trip
/// without pulling in a dedicated hex crate for one call site.
mod hex {
    pub fn encode_bytes(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload_bytes() -> Vec<u8> {
        let payload = Payload {
            timestamp: Some(1_700_000_000_000),
            seq: Some(1),
            metrics: vec![payload::Metric {
                name: Some("temp".into()),
                alias: None,
                timestamp: Some(1_700_000_000_000),
                datatype: Some(10), // double
                is_null: None,
                value: Some(payload::metric::Value::DoubleValue(42.5)),
            }],
        };
        let mut buf = Vec::new();
        payload.encode(&mut buf).unwrap();
        buf
    }

    #[test]
    fn decode_produces_canonical_json() {
        let bytes = sample_payload_bytes();
        let value = decode(&bytes).unwrap();
        assert_eq!(value["metrics"][0]["name"], "temp");
        assert_eq!(value["metrics"][0]["value"], 42.5);
    }

    #[test]
    fn round_trip_preserves_metric_structure() {
        let bytes = sample_payload_bytes();
        let decoded = decode(&bytes).unwrap();
        let re_encoded = encode(&decoded).unwrap();
        let re_decoded = decode(&re_encoded).unwrap();
        assert_eq!(decoded["metrics"][0]["name"], re_decoded["metrics"][0]["name"]);
        assert_eq!(decoded["metrics"][0]["value"], re_decoded["metrics"][0]["value"]);
    }

    #[test]
    fn large_long_value_canonicalizes_to_string() {
        let payload = Payload {
            timestamp: Some(1),
            seq: Some(1),
            metrics: vec![payload::Metric {
                name: Some("counter".into()),
                alias: None,
                timestamp: None,
                datatype: Some(8),
                is_null: None,
                value: Some(payload::metric::Value::LongValue(18_446_744_073_709_551_615)),
            }],
        };
        let mut buf = Vec::new();
        payload.encode(&mut buf).unwrap();
        let decoded = decode(&buf).unwrap();
        assert_eq!(
            decoded["metrics"][0]["value"],
            Value::String("18446744073709551615".to_string())
        );
    }

    #[test]
    fn decode_truncated_varint_errors() {
        // A field-2 (metrics, wire type 2 / length-delimited) tag followed
        // by a length that overruns the buffer.
        let truncated = vec![0x12, 0x7F, 0x01];
        assert!(decode(&truncated).is_err());
    }
}
