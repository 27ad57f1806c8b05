// SPDX-License-Identifier: Apache-2.0

//! Decode step (§4.2 step 3): Sparkplug B protobuf for `spBv1.0/` topics
//! when globally enabled, else UTF-8 + JSON, with defined fallback
//! envelopes at every failure point so `payload_text` is always valid JSON.

use serde_json::{Value, json};
use uns_model::canon::canonicalize_large_ints;

const SPARKPLUG_TOPIC_PREFIX: &str = "spBv1.0/";

/// Decode raw bytes for `topic` into a canonical JSON value and the
/// `origin_is_sparkplug` flag. The flag reflects which decode path was
/// *attempted* based on the topic and the global toggle, not whether
/// decoding *succeeded* -- D's round-trip re-encoding decision needs to
/// know the origin even when the Sparkplug payload itself was malformed.
pub fn decode(topic: &str, raw: &[u8], sparkplug_enabled: bool) -> (Value, bool) {
    if sparkplug_enabled && topic.starts_with(SPARKPLUG_TOPIC_PREFIX) {
        let mut value = match sparkplug_codec::decode(raw) {
            Ok(value) => value,
            Err(e) => json!({
                "raw_payload_hex": hex_encode(raw),
                "decode_error": e.to_string(),
            }),
        };
        canonicalize_large_ints(&mut value);
        return (value, true);
    }

    let mut value = match std::str::from_utf8(raw) {
        Ok(text) => match serde_json::from_str::<Value>(text) {
            Ok(value) => value,
            Err(_) => json!({ "raw_payload": text }),
        },
        Err(e) => json!({
            "raw_payload_hex": hex_encode(raw),
            "decode_error": e.to_string(),
        }),
    };
    canonicalize_large_ints(&mut value);
    (value, false)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_json_decodes_and_is_not_sparkplug() {
        let (value, is_sparkplug) = decode("a/b", br#"{"x":1}"#, true);
        assert_eq!(value["x"], 1);
        assert!(!is_sparkplug);
    }

    #[test]
    fn non_json_utf8_wraps_as_raw_payload() {
        let (value, is_sparkplug) = decode("a/b", b"hello world", true);
        assert_eq!(value["raw_payload"], "hello world");
        assert!(!is_sparkplug);
    }

    #[test]
    fn invalid_utf8_wraps_as_hex_with_decode_error() {
        let (value, is_sparkplug) = decode("a/b", &[0xff, 0xfe, 0x00], true);
        assert_eq!(value["raw_payload_hex"], "fffe00");
        assert!(value["decode_error"].is_string());
        assert!(!is_sparkplug);
    }

    #[test]
    fn sparkplug_topic_sets_origin_flag_even_on_decode_failure() {
        let (value, is_sparkplug) = decode("spBv1.0/g/NDATA/d", b"not a protobuf", true);
        assert!(is_sparkplug);
        assert!(value["decode_error"].is_string());
    }

    #[test]
    fn sparkplug_topic_falls_back_to_plain_decode_when_globally_disabled() {
        let (value, is_sparkplug) = decode("spBv1.0/g/NDATA/d", br#"{"ok":true}"#, false);
        assert!(!is_sparkplug);
        assert_eq!(value["ok"], true);
    }

    #[test]
    fn large_integers_are_canonicalized() {
        let (value, _) = decode("a/b", br#"{"v":18446744073709551615}"#, true);
        assert_eq!(value["v"], Value::String("18446744073709551615".to_string()));
    }
}
