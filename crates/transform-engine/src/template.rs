// SPDX-License-Identifier: Apache-2.0

//! `output_topic` template rendering (§3, §4.4): `{{key}}` placeholders
//! substituted against `{...payload, topic, brokerId}`.

use serde_json::Value;

/// Render `template`'s `{{key}}` placeholders against `payload` plus the
/// synthetic `topic`/`brokerId` fields. A placeholder with no match in
/// either source is left untouched, same as the substitution leaving a
/// literal string when a key is missing from the flattened object.
pub fn render_output_topic(template: &str, payload: &Value, topic: &str, broker_id: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    loop {
        match rest.find("{{") {
            None => {
                out.push_str(rest);
                break;
            }
            Some(start) => {
                out.push_str(&rest[..start]);
                let after_open = &rest[start + 2..];
                match after_open.find("}}") {
                    None => {
                        out.push_str(&rest[start..]);
                        break;
                    }
                    Some(end) => {
                        let key = after_open[..end].trim();
                        out.push_str(&resolve_placeholder(key, payload, topic, broker_id));
                        rest = &after_open[end + 2..];
                    }
                }
            }
        }
    }

    out
}

fn resolve_placeholder(key: &str, payload: &Value, topic: &str, broker_id: &str) -> String {
    match key {
        "topic" => topic.to_string(),
        "brokerId" => broker_id.to_string(),
        _ => match payload.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => format!("{{{{{key}}}}}"),
        },
    }
}
