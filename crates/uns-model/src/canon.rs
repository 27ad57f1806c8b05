// SPDX-License-Identifier: Apache-2.0

//! The single canonical number -> text convention used everywhere an
//! `Event`'s payload is produced: store, broadcast, and transform input
//! (§4.2 step 4). Integers outside the IEEE-754 double safe-integer range
//! are rewritten as decimal-string JSON values so that no consumer silently
//! loses precision on a protobuf `int64`/`uint64` metric.

use serde_json::Value;

/// The largest (and, negated, smallest) integer a `f64` can represent
/// exactly. `serde_json` numbers outside `[-MAX_SAFE_INT, MAX_SAFE_INT]` are
/// canonicalized to strings in place.
pub const MAX_SAFE_INT: i64 = 9_007_199_254_740_991; // 2^53 - 1

/// Walk a JSON value in place, rewriting any integer literal outside the
/// safe-integer range as its decimal string representation.
pub fn canonicalize_large_ints(value: &mut Value) {
    match value {
        Value::Number(n) => {
            if let Some(as_string) = oversized_to_string(n) {
                *value = Value::String(as_string);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                canonicalize_large_ints(item);
            }
        }
        Value::Object(map) => {
            for (_, v) in map.iter_mut() {
                canonicalize_large_ints(v);
            }
        }
        _ => {}
    }
}

fn oversized_to_string(n: &serde_json::Number) -> Option<String> {
    if let Some(i) = n.as_i64() {
        if i.unsigned_abs() as i128 > MAX_SAFE_INT as i128 {
            return Some(i.to_string());
        }
    } else if let Some(u) = n.as_u64() {
        if u > MAX_SAFE_INT as u64 {
            return Some(u.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn small_integers_are_untouched() {
        let mut v = json!({"a": 42, "b": -7});
        canonicalize_large_ints(&mut v);
        assert_eq!(v, json!({"a": 42, "b": -7}));
    }

    #[test]
    fn oversized_integer_becomes_string() {
        let mut v = json!({"a": 9_007_199_254_740_993_u64});
        canonicalize_large_ints(&mut v);
        assert_eq!(v["a"], Value::String("9007199254740993".to_string()));
    }

    #[test]
    fn recurses_into_arrays_and_nested_objects() {
        let mut v = json!({"items": [{"v": 18_446_744_073_709_551_615_u64}]});
        canonicalize_large_ints(&mut v);
        assert_eq!(
            v["items"][0]["v"],
            Value::String("18446744073709551615".to_string())
        );
    }

    #[test]
    fn floats_are_left_alone() {
        let mut v = json!({"a": 1.5});
        canonicalize_large_ints(&mut v);
        assert_eq!(v, json!({"a": 1.5}));
    }
}
