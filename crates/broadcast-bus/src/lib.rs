// SPDX-License-Identifier: Apache-2.0

//! The Status/Broadcast Bus (G, §4.7): a single fan-out channel that pushes
//! [`BroadcastEnvelope`]s to every current subscriber. Delivery is
//! best-effort -- a subscriber that falls behind tokio's broadcast channel
//! capacity silently misses the messages it couldn't keep up with, same as
//! any other subscriber to a `tokio::sync::broadcast` channel.

use tokio::sync::broadcast;
use tracing::warn;
use uns_model::BroadcastEnvelope;

const DEFAULT_CAPACITY: usize = 1024;

/// Owns the sending half of the broadcast channel. Cheap to clone; every
/// clone publishes onto the same underlying channel.
#[derive(Clone)]
pub struct BroadcastBus {
    tx: broadcast::Sender<BroadcastEnvelope>,
}

impl BroadcastBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to future envelopes. Each subscriber gets its own lagging
    /// cursor into the channel.
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEnvelope> {
        self.tx.subscribe()
    }

    /// Push an envelope to all current subscribers. A publish with zero
    /// subscribers is not an error -- it's the normal state before the
    /// HTTP/WS layer has any connections.
    pub fn publish(&self, envelope: BroadcastEnvelope) {
        if let Err(e) = self.tx.send(envelope) {
            warn!("broadcast bus has no subscribers: {e}");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uns_model::broker::{BrokerStatus, BrokerStatusKind, StatusSequencer};

    fn sample_status() -> BroadcastEnvelope {
        let seq = StatusSequencer::new();
        BroadcastEnvelope::BrokerStatus {
            status: BrokerStatus::new("b1", BrokerStatusKind::Connected, None, &seq),
        }
    }

    #[tokio::test]
    async fn subscriber_receives_published_envelope() {
        let bus = BroadcastBus::new();
        let mut rx = bus.subscribe();

        bus.publish(sample_status());

        let received = rx.recv().await.unwrap();
        assert!(matches!(received, BroadcastEnvelope::BrokerStatus { .. }));
    }

    #[tokio::test]
    async fn multiple_subscribers_each_get_a_copy() {
        let bus = BroadcastBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(sample_status());

        assert!(rx1.recv().await.is_ok());
        assert!(rx2.recv().await.is_ok());
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let bus = BroadcastBus::new();
        bus.publish(sample_status());
    }

    #[test]
    fn subscriber_count_tracks_active_subscriptions() {
        let bus = BroadcastBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        let _rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
    }
}
