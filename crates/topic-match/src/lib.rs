// SPDX-License-Identifier: Apache-2.0

//! MQTT topic wildcard matching, used by:
//!
//! - the ACL Matcher (H, §4.8) to gate every outbound publish,
//! - the transform engine (D, §4.4) to match `source_topic` patterns, and
//! - the alert engine (E, §4.5), which needs the same wildcard semantics
//!   compiled to a `Regex` for full-match evaluation.

use regex::Regex;

/// Segment-by-segment MQTT wildcard match. `+` matches exactly one segment;
/// `#` matches the rest of the topic (including zero remaining segments) and
/// must be the final token in `pattern`.
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    let pattern_segments: Vec<&str> = pattern.split('/').collect();
    let topic_segments: Vec<&str> = topic.split('/').collect();
    matches_from(&pattern_segments, &topic_segments)
}

fn matches_from(pattern: &[&str], topic: &[&str]) -> bool {
    match (pattern.first(), topic.first()) {
        (Some(&"#"), _) => true,
        (Some(&"+"), Some(_)) => matches_from(&pattern[1..], &topic[1..]),
        (Some(&"+"), None) => false,
        (Some(p), Some(t)) if *p == *t => matches_from(&pattern[1..], &topic[1..]),
        (Some(_), _) => false,
        (None, None) => true,
        (None, Some(_)) => false,
    }
}

/// The ACL Matcher (H). An empty `patterns` list is explicit deny-all
/// (read-only broker, §4.8).
pub fn allowed(patterns: &[String], topic: &str) -> bool {
    if patterns.is_empty() {
        return false;
    }
    patterns.iter().any(|p| topic_matches(p, topic))
}

/// Compile an MQTT wildcard pattern to a fully-anchored `Regex`, used by the
/// alert engine to evaluate `topic_pattern` (§4.5): `+` becomes `[^/]+`, `#`
/// becomes `.*`, other characters are regex-escaped.
pub fn pattern_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let segments: Vec<&str> = pattern.split('/').collect();
    let mut out = String::from("^");
    for (i, segment) in segments.iter().enumerate() {
        if *segment == "#" && i == segments.len() - 1 {
            // `#` also matches the parent level itself, so `a/#` matches
            // both `a` and `a/b/c` — not just topics with a trailing segment.
            if i == 0 {
                out.push_str(".*");
            } else {
                out.push_str("(/.*)?");
            }
            break;
        }
        if i > 0 {
            out.push('/');
        }
        match *segment {
            "+" => out.push_str("[^/]+"),
            other => out.push_str(&regex::escape(other)),
        }
    }
    out.push('$');
    Regex::new(&out)
}
