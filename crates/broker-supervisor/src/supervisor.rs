// SPDX-License-Identifier: Apache-2.0

// src/supervisor.rs
// Component A: owns one BrokerClient per configured broker, drives each
// broker's connection-status state machine off the client's raw
// ConnectionEvents, and gates every outbound publish through the ACL
// matcher (H).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use broadcast_bus::BroadcastBus;
use broker_client::{
    BrokerClient, ClientCredentials, ClientOptions, ClientTlsConfig, ClientTlsIdentity,
    ConnectionEvent, QoS, RawMessage,
};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uns_model::broker::{BrokerConfig, BrokerStatus, BrokerStatusKind, StatusSequencer, TlsMode};

use crate::errors::BrokerSupervisorError;

/// An inbound publish tagged with the broker it arrived on; this is what
/// gets handed to the message handler (B).
#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub broker_id: String,
    pub topic: String,
    pub payload: Vec<u8>,
    pub payload_size: usize,
}

/// The four publish outcomes §4.1 calls out. `RejectedByAcl` must never be
/// retried by the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    Accepted,
    RejectedByAcl,
    NoConnection,
    SendError(String),
}

struct BrokerHandle {
    client: Arc<BrokerClient>,
    config: BrokerConfig,
    sequencer: StatusSequencer,
    // The last status actually emitted, sequence number included. Snapshot
    // reads (broker_status_all) clone this rather than minting a fresh
    // sequence number off `sequencer`, which is reserved for real
    // transitions.
    last_status: std::sync::RwLock<BrokerStatus>,
    shutting_down: AtomicBool,
    subscribed: AtomicBool,
}

/// Component A. One per process; owns every configured broker's client.
pub struct BrokerSupervisor {
    brokers: Arc<DashMap<String, Arc<BrokerHandle>>>,
    bus: BroadcastBus,
}

impl BrokerSupervisor {
    pub fn new(bus: BroadcastBus) -> Self {
        Self {
            brokers: Arc::new(DashMap::new()),
            bus,
        }
    }

    /// Connect a configured broker and start driving its state machine.
    /// Returns a channel of raw inbound publishes for the message handler
    /// to consume.
    pub async fn add_broker(
        &self,
        config: BrokerConfig,
    ) -> Result<mpsc::Receiver<InboundMessage>, BrokerSupervisorError> {
        if self.brokers.contains_key(&config.id) {
            return Err(BrokerSupervisorError::AlreadyAdded(config.id));
        }

        if !config.reject_unauthorized {
            warn!(
                broker_id = %config.id,
                "reject_unauthorized=false: TLS certificate verification is DISABLED for this broker"
            );
        }

        let client_options = build_client_options(&config)?;
        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("uns-hub-{}", config.id));

        let client = BrokerClient::new(&config.host, config.port, &client_id, Some(client_options))
            .await?;

        let (raw_rx, status_rx) = client.connect().await?;

        let sequencer = StatusSequencer::new();
        let initial_status = BrokerStatus::new(
            config.id.clone(),
            BrokerStatusKind::Connecting,
            None,
            &sequencer,
        );
        let handle = Arc::new(BrokerHandle {
            client: client.clone(),
            config: config.clone(),
            sequencer,
            last_status: std::sync::RwLock::new(initial_status.clone()),
            shutting_down: AtomicBool::new(false),
            subscribed: AtomicBool::new(false),
        });
        self.brokers.insert(config.id.clone(), handle.clone());

        self.bus
            .publish(uns_model::BroadcastEnvelope::BrokerStatus { status: initial_status });

        let (inbound_tx, inbound_rx) = mpsc::channel(1000);
        spawn_message_relay(config.id.clone(), raw_rx, inbound_tx);
        self.spawn_status_driver(handle, status_rx);

        Ok(inbound_rx)
    }

    fn spawn_status_driver(
        &self,
        handle: Arc<BrokerHandle>,
        mut status_rx: mpsc::Receiver<ConnectionEvent>,
    ) {
        let supervisor_bus = self.bus.clone();
        let brokers = self.brokers.clone();
        tokio::spawn(async move {
            while let Some(event) = status_rx.recv().await {
                if handle.shutting_down.load(Ordering::Relaxed) {
                    continue;
                }
                match event {
                    ConnectionEvent::Connected => {
                        emit_status(&handle, &supervisor_bus, &brokers, BrokerStatusKind::Connected, None);
                        if !handle.subscribed.swap(true, Ordering::SeqCst) {
                            subscribe_all(&handle).await;
                        }
                    }
                    ConnectionEvent::Closed => {
                        emit_status(
                            &handle,
                            &supervisor_bus,
                            &brokers,
                            BrokerStatusKind::Disconnected,
                            None,
                        );
                    }
                    ConnectionEvent::Error(message) => {
                        emit_status(
                            &handle,
                            &supervisor_bus,
                            &brokers,
                            BrokerStatusKind::Error,
                            Some(message),
                        );
                        // The event loop backs off and retries on its own; the
                        // only application-visible signal of that retry is this
                        // status transition back to `connecting`.
                        emit_status(&handle, &supervisor_bus, &brokers, BrokerStatusKind::Connecting, None);
                    }
                }
            }
        });
    }

    /// `publish(broker_id, topic, payload, qos, retain)` from §4.1. An
    /// unknown `broker_id` fails fast rather than returning `NoConnection`.
    pub async fn publish(
        &self,
        broker_id: &str,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    ) -> Result<PublishOutcome, BrokerSupervisorError> {
        let handle = self
            .brokers
            .get(broker_id)
            .ok_or_else(|| BrokerSupervisorError::UnknownBroker(broker_id.to_string()))?
            .clone();

        if !topic_match::allowed(&handle.config.publish, topic) {
            return Ok(PublishOutcome::RejectedByAcl);
        }

        let current_status = handle.last_status.read().unwrap().status;
        if !matches!(current_status, BrokerStatusKind::Connected) {
            return Ok(PublishOutcome::NoConnection);
        }

        let publish_options = broker_client::PublishOptions {
            qos: Some(qos),
            retain: Some(retain),
        };
        match handle
            .client
            .publish_with_opts(topic, Some(publish_options), payload)
            .await
        {
            Ok(()) => Ok(PublishOutcome::Accepted),
            Err(e) => Ok(PublishOutcome::SendError(e.to_string())),
        }
    }

    /// Snapshot of every broker's current status, for the
    /// `broker-status-all` envelope.
    pub fn broker_status_all(&self) -> Vec<BrokerStatus> {
        self.brokers
            .iter()
            .map(|entry| entry.value().last_status.read().unwrap().clone())
            .collect()
    }

    /// Mark every broker `shutting_down` and disconnect its client. Further
    /// status events from the event loop are ignored.
    pub async fn shutdown(&self) {
        for entry in self.brokers.iter() {
            let handle = entry.value().clone();
            handle.shutting_down.store(true, Ordering::SeqCst);
            emit_status(&handle, &self.bus, &self.brokers, BrokerStatusKind::ShuttingDown, None);
            if let Err(e) = handle.client.disconnect().await {
                warn!(broker_id = %handle.config.id, error = %e, "error disconnecting broker");
            }
        }
    }
}

/// Emit the per-broker transition plus a `broker-status-all` snapshot of
/// every configured broker's current status (SPEC_FULL §3), so a freshly
/// connected dashboard client sees the fleet state without waiting for the
/// next individual transition.
fn emit_status(
    handle: &BrokerHandle,
    bus: &BroadcastBus,
    brokers: &DashMap<String, Arc<BrokerHandle>>,
    kind: BrokerStatusKind,
    last_error: Option<String>,
) {
    let status = BrokerStatus::new(handle.config.id.clone(), kind, last_error, &handle.sequencer);
    *handle.last_status.write().unwrap() = status.clone();
    bus.publish(uns_model::BroadcastEnvelope::BrokerStatus { status });

    let statuses = brokers
        .iter()
        .map(|entry| entry.value().last_status.read().unwrap().clone())
        .collect();
    bus.publish(uns_model::BroadcastEnvelope::BrokerStatusAll { statuses });
}

async fn subscribe_all(handle: &BrokerHandle) {
    for pattern in &handle.config.subscribe {
        if let Err(e) = handle.client.subscribe(pattern, QoS::AtLeastOnce).await {
            warn!(
                broker_id = %handle.config.id,
                topic = %pattern,
                error = %e,
                "failed to subscribe"
            );
        }
    }
    info!(broker_id = %handle.config.id, count = handle.config.subscribe.len(), "subscribed");
}

fn spawn_message_relay(
    broker_id: String,
    mut raw_rx: mpsc::Receiver<RawMessage>,
    inbound_tx: mpsc::Sender<InboundMessage>,
) {
    tokio::spawn(async move {
        while let Some(msg) = raw_rx.recv().await {
            let inbound = InboundMessage {
                broker_id: broker_id.clone(),
                topic: msg.topic,
                payload: msg.payload,
                payload_size: msg.payload_size,
            };
            if inbound_tx.send(inbound).await.is_err() {
                break;
            }
        }
    });
}

fn build_client_options(config: &BrokerConfig) -> Result<ClientOptions, BrokerSupervisorError> {
    let mut options = ClientOptions::default();

    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        options = options.with_credentials(ClientCredentials {
            username: username.clone(),
            password: password.clone(),
        });
    }

    if let Some(tls) = build_tls_config(config)? {
        options.tls_config = Some(tls);
    }

    Ok(options)
}

fn build_tls_config(
    config: &BrokerConfig,
) -> Result<Option<ClientTlsConfig>, BrokerSupervisorError> {
    let read = |path: &str| -> Result<Vec<u8>, BrokerSupervisorError> {
        std::fs::read(path).map_err(|source| BrokerSupervisorError::TlsMaterial {
            broker_id: config.id.clone(),
            source,
        })
    };

    match &config.tls {
        TlsMode::None => Ok(None),
        TlsMode::ServerVerify { ca_path } => Ok(Some(ClientTlsConfig {
            ca_certificate: read(ca_path)?,
            client_identity: None,
        })),
        TlsMode::Mutual {
            ca_path,
            client_cert_path,
            client_key_path,
        } => Ok(Some(ClientTlsConfig {
            ca_certificate: read(ca_path)?,
            client_identity: Some(ClientTlsIdentity {
                certificate: read(client_cert_path)?,
                private_key: read(client_key_path)?,
            }),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(id: &str, publish: Vec<String>) -> BrokerConfig {
        BrokerConfig {
            id: id.to_string(),
            host: "127.0.0.1".to_string(),
            port: 1883,
            client_id: None,
            username: None,
            password: None,
            subscribe: vec![],
            publish,
            tls: TlsMode::None,
            reject_unauthorized: true,
        }
    }

    #[tokio::test]
    async fn add_broker_twice_fails() {
        let supervisor = BrokerSupervisor::new(BroadcastBus::new());
        supervisor
            .add_broker(test_config("b1", vec![]))
            .await
            .unwrap();

        let second = supervisor.add_broker(test_config("b1", vec![])).await;
        assert!(matches!(second, Err(BrokerSupervisorError::AlreadyAdded(_))));
    }

    #[tokio::test]
    async fn publish_to_unknown_broker_fails_fast() {
        let supervisor = BrokerSupervisor::new(BroadcastBus::new());
        let result = supervisor
            .publish("nonexistent", "a/b", b"x".to_vec(), QoS::AtLeastOnce, false)
            .await;
        assert!(matches!(
            result,
            Err(BrokerSupervisorError::UnknownBroker(_))
        ));
    }

    #[tokio::test]
    async fn publish_denied_by_empty_acl() {
        let supervisor = BrokerSupervisor::new(BroadcastBus::new());
        supervisor
            .add_broker(test_config("b1", vec![]))
            .await
            .unwrap();

        let outcome = supervisor
            .publish("b1", "a/b", b"x".to_vec(), QoS::AtLeastOnce, false)
            .await
            .unwrap();
        assert_eq!(outcome, PublishOutcome::RejectedByAcl);
    }

    #[tokio::test]
    async fn publish_without_connection_reports_no_connection() {
        let supervisor = BrokerSupervisor::new(BroadcastBus::new());
        supervisor
            .add_broker(test_config("b1", vec!["a/#".to_string()]))
            .await
            .unwrap();

        // No real broker is listening, so the status driver never observes
        // a Connected event; publish must report NoConnection rather than
        // attempting a send on an unconnected client.
        let outcome = supervisor
            .publish("b1", "a/b", b"x".to_vec(), QoS::AtLeastOnce, false)
            .await
            .unwrap();
        assert_eq!(outcome, PublishOutcome::NoConnection);
    }

    #[tokio::test]
    async fn broker_status_all_reports_every_configured_broker() {
        let supervisor = BrokerSupervisor::new(BroadcastBus::new());
        supervisor
            .add_broker(test_config("b1", vec![]))
            .await
            .unwrap();
        supervisor
            .add_broker(test_config("b2", vec![]))
            .await
            .unwrap();

        let statuses = supervisor.broker_status_all();
        assert_eq!(statuses.len(), 2);
    }
}
