// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The atomic unit flowing through the hub: one decoded MQTT message.
///
/// `payload_text` is always valid JSON text by the time an `Event` exists —
/// decode errors, oversize payloads, and raw non-JSON bytes are all wrapped
/// into a JSON envelope before the `Event` is constructed (see
/// `message-handler`'s decode step). That invariant is what lets `store` and
/// `transform-engine` treat `payload_text` uniformly.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub broker_id: String,
    pub topic: String,
    pub timestamp: DateTime<Utc>,
    pub payload_text: String,
    pub origin_is_sparkplug: bool,
    /// Set by the transform engine's store-need prefilter (§4.4/§4.2 step 5).
    /// Persistence uses this to decide whether to replay the event to the
    /// transform engine after the enclosing batch commits.
    pub needs_store_for_transform: bool,
}

impl Event {
    pub fn new(
        broker_id: impl Into<String>,
        topic: impl Into<String>,
        timestamp: DateTime<Utc>,
        payload_text: impl Into<String>,
        origin_is_sparkplug: bool,
    ) -> Self {
        Self {
            broker_id: broker_id.into(),
            topic: topic.into(),
            timestamp,
            payload_text: payload_text.into(),
            origin_is_sparkplug,
            needs_store_for_transform: false,
        }
    }

    /// Parse `payload_text` back into a `serde_json::Value`.
    ///
    /// This should never fail given the invariant above, but callers that
    /// pass events to sandboxed scripts decode lazily rather than trusting
    /// it blindly.
    pub fn payload_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.payload_text)
    }

    /// The `(broker_id, first-two-topic-segments)` key used for namespace
    /// throttling (§4.2 step 1) and transform-metrics attribution.
    pub fn namespace_key(&self) -> String {
        namespace_key(&self.broker_id, &self.topic)
    }
}

/// Compute the namespace throttle key for a `(broker_id, topic)` pair:
/// `broker_id + ":" + first-two-segments-of(topic)`, or a single segment if
/// the topic doesn't have two.
pub fn namespace_key(broker_id: &str, topic: &str) -> String {
    let mut segments = topic.splitn(3, '/');
    let first = segments.next().unwrap_or("");
    match segments.next() {
        Some(second) => format!("{broker_id}:{first}/{second}"),
        None => format!("{broker_id}:{first}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_key_two_segments() {
        assert_eq!(namespace_key("b1", "a/b/x"), "b1:a/b");
    }

    #[test]
    fn namespace_key_single_segment() {
        assert_eq!(namespace_key("b1", "a"), "b1:a");
    }

    #[test]
    fn event_payload_value_roundtrips() {
        let event = Event::new("b1", "a/b", Utc::now(), r#"{"x":1}"#, false);
        let value = event.payload_value().unwrap();
        assert_eq!(value["x"], 1);
    }
}
