// SPDX-License-Identifier: Apache-2.0

//! The append-only `mqtt_events` table: batch inserts and read-only
//! projections for D, E, and the sandbox's `db` object (§4.6).

use duckdb::Connection;
use duckdb::types::Value as DuckValue;
use serde_json::{Map, Value, json};
use uns_model::Event;

use crate::errors::{StoreError, StoreResult};

#[derive(Clone, Copy, Debug, Default)]
pub struct BatchInsertOutcome {
    pub inserted: usize,
}

/// Insert every event in `batch` inside one transaction. A per-row insert
/// failure is counted, not propagated immediately; if any row failed the
/// entire batch is rolled back so readers never observe a partial batch
/// (§4.3, §8.3).
pub fn insert_batch(conn: &mut Connection, batch: &[Event]) -> StoreResult<BatchInsertOutcome> {
    let tx = conn.transaction()?;
    let mut failed = 0usize;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO mqtt_events (timestamp, topic, payload, broker_id) VALUES (?, ?, ?, ?)",
        )?;
        for event in batch {
            let result = stmt.execute(duckdb::params![
                event.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                event.topic,
                event.payload_text,
                event.broker_id,
            ]);
            if result.is_err() {
                failed += 1;
            }
        }
    }

    if failed > 0 {
        tx.rollback()?;
        return Err(StoreError::BatchFailed {
            total: batch.len(),
            failed,
        });
    }

    tx.commit()?;
    Ok(BatchInsertOutcome {
        inserted: batch.len(),
    })
}

/// `db.all(sql)` from the sandbox contract (§4.4): every matching row as a
/// JSON object keyed by column name. Callers must have already rejected
/// anything but a `SELECT` (see `sandbox::guard_select`).
pub fn query_all(conn: &Connection, sql: &str) -> StoreResult<Vec<Value>> {
    let mut stmt = conn.prepare(sql)?;
    let column_names = stmt.column_names();
    let rows = stmt.query_map([], move |row| {
        let mut map = Map::with_capacity(column_names.len());
        for (i, name) in column_names.iter().enumerate() {
            map.insert(name.clone(), duckdb_value_to_json(row.get::<_, DuckValue>(i)?));
        }
        Ok(Value::Object(map))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let mut value = row?;
        uns_model::canon::canonicalize_large_ints(&mut value);
        out.push(value);
    }
    Ok(out)
}

/// `db.get(sql)`: the first row only, or `None` if the query matched
/// nothing.
pub fn query_one(conn: &Connection, sql: &str) -> StoreResult<Option<Value>> {
    Ok(query_all(conn, sql)?.into_iter().next())
}

fn duckdb_value_to_json(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(b) => json!(b),
        DuckValue::TinyInt(i) => json!(i),
        DuckValue::SmallInt(i) => json!(i),
        DuckValue::Int(i) => json!(i),
        DuckValue::BigInt(i) => json!(i),
        DuckValue::HugeInt(i) => json!(i.to_string()),
        DuckValue::UTinyInt(i) => json!(i),
        DuckValue::USmallInt(i) => json!(i),
        DuckValue::UInt(i) => json!(i),
        DuckValue::UBigInt(i) => json!(i),
        DuckValue::Float(f) => json!(f),
        DuckValue::Double(f) => json!(f),
        // A JSON-typed column round-trips as text already formatted as
        // JSON; embed it as a nested value rather than a double-encoded
        // string when it parses, so `payload->>'x'` projections and whole
        // `payload` reads both come back shaped the way a caller expects.
        DuckValue::Text(s) => match serde_json::from_str::<Value>(&s) {
            Ok(nested @ (Value::Object(_) | Value::Array(_))) => nested,
            _ => Value::String(s),
        },
        DuckValue::Blob(bytes) => json!(bytes.iter().map(|b| format!("{b:02x}")).collect::<String>()),
        other => json!(format!("{other:?}")),
    }
}
