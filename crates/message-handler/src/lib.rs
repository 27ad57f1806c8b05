// SPDX-License-Identifier: Apache-2.0

//! Component B, the Message Handler (§4.2): the single entry point every
//! inbound broker frame passes through before it reaches persistence,
//! transforms, or alerts. Runs cooperatively on the broker's receive path;
//! never blocks on I/O and never propagates an error back to A.

mod decode;
mod throttle;

use std::sync::Arc;

use broadcast_bus::BroadcastBus;
use chrono::Utc;
use tracing::warn;
use uns_model::Event;

pub use throttle::NamespaceThrottle;

const MAX_PAYLOAD_BYTES: usize = uns_config::MAX_PAYLOAD_BYTES;

/// Builds the oversized-payload envelope (§8 S2) with its documented key
/// order verbatim, since `serde_json`'s default map serializes keys
/// alphabetically and S2 is checked by exact text.
fn oversized_payload_text(original_size_bytes: usize) -> String {
    format!(
        "{{\"error\":\"PAYLOAD_TOO_LARGE\",\"original_size_bytes\":{},\"message\":\"Payload exceeded safe limit (2MB) and was discarded.\"}}",
        original_size_bytes
    )
}

pub struct MessageHandler {
    throttle: Arc<NamespaceThrottle>,
    persistence: Arc<persistence::PersistenceQueue>,
    transform_engine: transform_engine::TransformEngine,
    alert_engine: alert_engine::AlertEngine,
    bus: BroadcastBus,
    sparkplug_enabled: bool,
}

impl MessageHandler {
    pub fn new(
        persistence: Arc<persistence::PersistenceQueue>,
        transform_engine: transform_engine::TransformEngine,
        alert_engine: alert_engine::AlertEngine,
        bus: BroadcastBus,
        sparkplug_enabled: bool,
    ) -> Self {
        Self {
            throttle: NamespaceThrottle::new(uns_config::MAX_MSGS_PER_SEC_PER_NAMESPACE),
            persistence,
            transform_engine,
            alert_engine,
            bus,
            sparkplug_enabled,
        }
    }

    /// Start the namespace throttle's periodic reset worker. Owned by the
    /// caller so it can be aborted on shutdown.
    pub fn spawn_throttle_reset(&self) -> tokio::task::JoinHandle<()> {
        self.throttle.spawn_reset_loop()
    }

    /// `handle(broker_id, topic, raw_bytes)` (§4.2), invoked from A's
    /// receive callback. Never throws: every failure mode is classified
    /// into a payload envelope and carried through the rest of the
    /// pipeline rather than surfaced to the caller.
    pub async fn handle(&self, broker_id: &str, topic: &str, raw: Vec<u8>) {
        if topic.contains('\0') {
            warn!(broker_id, "rejecting topic containing NUL byte");
            return;
        }

        let namespace_key = uns_model::event::namespace_key(broker_id, topic);
        if !self.throttle.gate(&namespace_key) {
            return;
        }

        let (payload_text, origin_is_sparkplug) = if raw.len() > MAX_PAYLOAD_BYTES {
            (oversized_payload_text(raw.len()), false)
        } else {
            let (payload, origin_is_sparkplug) = decode::decode(topic, &raw, self.sparkplug_enabled);
            let text = match serde_json::to_string(&payload) {
                Ok(text) => text,
                Err(e) => {
                    // Can only happen if `payload` somehow isn't serializable,
                    // which none of the construction paths above produce.
                    warn!(broker_id, topic, error = %e, "failed to serialize decoded payload");
                    return;
                }
            };
            (text, origin_is_sparkplug)
        };

        let needs_store_for_transform = self.transform_engine.rules_require_store(topic);
        let mut event = Event::new(broker_id, topic, Utc::now(), payload_text, origin_is_sparkplug);
        event.needs_store_for_transform = needs_store_for_transform;

        self.bus.publish(uns_model::BroadcastEnvelope::MqttMessage {
            broker_id: event.broker_id.clone(),
            topic: event.topic.clone(),
            payload_text: event.payload_text.clone(),
            timestamp: event.timestamp,
        });

        self.persistence.insert(event.clone());

        if !needs_store_for_transform {
            self.transform_engine.handle_event(&event).await;
        }

        self.alert_engine.handle_event_detached(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_supervisor::BrokerSupervisor;

    async fn handler() -> MessageHandler {
        let bus = BroadcastBus::new();
        let store = store::Store::open_in_memory().unwrap();
        let supervisor = Arc::new(BrokerSupervisor::new(bus.clone()));
        let transform_engine = transform_engine::TransformEngine::new(
            uns_model::rules::VersionedRuleSet::default(),
            Some(store.clone()),
            supervisor,
            bus.clone(),
        );
        let alert_engine = alert_engine::AlertEngine::new(store.clone(), bus.clone(), false);
        let persistence = persistence::PersistenceQueue::new(
            store,
            Arc::new(transform_engine.clone()),
            persistence::PersistenceConfig::default(),
        );
        MessageHandler::new(persistence, transform_engine, alert_engine, bus, true)
    }

    #[tokio::test]
    async fn oversized_payload_is_wrapped_and_still_enqueued() {
        let handler = handler().await;
        let mut rx = handler.bus.subscribe();
        let raw = vec![0u8; MAX_PAYLOAD_BYTES + 1];
        handler.handle("b1", "a/b", raw.clone()).await;

        let stats = handler.persistence.stats();
        assert_eq!(stats.pending, 1);

        let envelope = rx.recv().await.unwrap();
        let uns_model::BroadcastEnvelope::MqttMessage { payload_text, .. } = envelope else {
            panic!("expected an MqttMessage envelope, got {envelope:?}");
        };
        assert_eq!(
            payload_text,
            format!(
                "{{\"error\":\"PAYLOAD_TOO_LARGE\",\"original_size_bytes\":{},\"message\":\"Payload exceeded safe limit (2MB) and was discarded.\"}}",
                raw.len()
            )
        );
    }

    #[tokio::test]
    async fn namespace_over_limit_is_dropped() {
        let handler = handler().await;
        for _ in 0..(uns_config::MAX_MSGS_PER_SEC_PER_NAMESPACE + 5) {
            handler.handle("b1", "a/b", br#"{"x":1}"#.to_vec()).await;
        }

        let stats = handler.persistence.stats();
        assert_eq!(stats.pending as u32, uns_config::MAX_MSGS_PER_SEC_PER_NAMESPACE);
    }

    #[tokio::test]
    async fn topic_with_nul_byte_is_rejected() {
        let handler = handler().await;
        handler.handle("b1", "a/\0/b", br#"{}"#.to_vec()).await;

        let stats = handler.persistence.stats();
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn well_formed_message_is_decoded_and_enqueued() {
        let handler = handler().await;
        handler.handle("b1", "a/b", br#"{"x":1}"#.to_vec()).await;

        let stats = handler.persistence.stats();
        assert_eq!(stats.pending, 1);
    }
}
