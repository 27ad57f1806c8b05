// SPDX-License-Identifier: Apache-2.0

// src/client/core.rs
// Per-broker MQTT client. Unlike a typed pub/sub client, this hands raw
// `(topic, bytes)` pairs upstream and lets the message handler (component B,
// one layer up in `uns-hub`) own all decoding -- this client's only job is
// connection lifecycle, subscribe/publish, and backoff/reconnect.

use std::sync::Arc;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

use crate::auth::CredentialsProvider;
use crate::client::options::{ClientOptions, PublishOptions};
use crate::errors::BrokerClientError;
use crate::stats::{PublishStats, PublishStatsTracker, QueueStats, QueueStatsTracker};

const DEFAULT_KEEP_ALIVE: std::time::Duration = std::time::Duration::from_secs(300);
const DEFAULT_QOS: QoS = QoS::AtLeastOnce;
const DEFAULT_RETAIN: bool = false;
const DEFAULT_MESSAGE_CHANNEL_CAPACITY: usize = 1000;
const DEFAULT_CLIENT_QUEUE_SIZE: usize = 5000;

// RawMessage is a decoded-nothing inbound publish: just the topic and the
// bytes as they came off the wire. Component B is responsible for turning
// this into an `Event`.
#[derive(Clone, Debug)]
pub struct RawMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub payload_size: usize,
}

// ConnectionEvent is the raw signal this client surfaces on every
// connect/disconnect/error transition of the underlying rumqttc event
// loop. broker-supervisor owns turning this into the `BrokerStatusKind`
// state machine -- this client doesn't try to interpret it itself (per
// SPEC_FULL §4.1: "the supervisor only reacts to library events").
#[derive(Clone, Debug)]
pub enum ConnectionEvent {
    Connected,
    Closed,
    Error(String),
}

// BrokerClient owns one rumqttc connection to one broker.
pub struct BrokerClient {
    client: Arc<AsyncClient>,
    client_id: String,
    event_loop: Arc<Mutex<Option<EventLoop>>>,
    client_options: Option<ClientOptions>,
    credentials_provider: Option<Arc<dyn CredentialsProvider>>,
    queue_stats: Arc<QueueStatsTracker>,
    publish_stats: Arc<PublishStatsTracker>,
}

impl BrokerClient {
    // new creates a client and, if a credentials provider is configured,
    // fetches initial credentials before constructing the rumqttc options.
    pub async fn new(
        broker_host: &str,
        broker_port: u16,
        client_id: &str,
        client_options: Option<ClientOptions>,
    ) -> Result<Arc<Self>, BrokerClientError> {
        let mut mqtt_options = MqttOptions::new(client_id, broker_host, broker_port);
        mqtt_options.set_keep_alive(
            client_options
                .as_ref()
                .and_then(|opts| opts.keep_alive)
                .unwrap_or(DEFAULT_KEEP_ALIVE),
        );
        mqtt_options.set_clean_session(false);

        if let Some(tls) = client_options.as_ref().and_then(|opts| opts.tls_config.as_ref()) {
            mqtt_options.set_transport(super::options::client_transport(tls));
        }

        if let Some(provider) = client_options
            .as_ref()
            .and_then(|opts| opts.credentials_provider.as_ref())
        {
            let credentials = provider
                .get_credentials()
                .await
                .map_err(|e| BrokerClientError::credentials_error(e.to_string()))?;
            mqtt_options.set_credentials(credentials.username, credentials.password);
        }

        let (client, event_loop) = AsyncClient::new(
            mqtt_options,
            client_options
                .as_ref()
                .and_then(|opts| opts.message_channel_capacity)
                .unwrap_or(DEFAULT_MESSAGE_CHANNEL_CAPACITY),
        );

        let credentials_provider = client_options
            .as_ref()
            .and_then(|opts| opts.credentials_provider.clone());

        info!("created broker client for {}:{}", broker_host, broker_port);

        Ok(Arc::new(Self {
            client: Arc::new(client),
            client_id: client_id.into(),
            event_loop: Arc::new(Mutex::new(Some(event_loop))),
            client_options,
            credentials_provider,
            queue_stats: Arc::new(QueueStatsTracker::new()),
            publish_stats: Arc::new(PublishStatsTracker::new()),
        }))
    }

    // connect starts the event loop task and returns a channel of raw
    // inbound publishes plus a channel of connection lifecycle events.
    // Can only be called once per client.
    pub async fn connect(
        self: &Arc<Self>,
    ) -> Result<(mpsc::Receiver<RawMessage>, mpsc::Receiver<ConnectionEvent>), BrokerClientError>
    {
        let mut event_loop = self
            .event_loop
            .lock()
            .await
            .take()
            .ok_or(BrokerClientError::AlreadyStartedError)?;

        let (message_tx, message_rx) = mpsc::channel::<RawMessage>(
            self.client_options
                .as_ref()
                .and_then(|opts| opts.client_queue_size)
                .unwrap_or(DEFAULT_CLIENT_QUEUE_SIZE),
        );
        let (status_tx, status_rx) = mpsc::channel::<ConnectionEvent>(16);

        let queue_stats = self.queue_stats.clone();
        let credentials_provider = self.credentials_provider.clone();
        let mut backoff_strategy = SuperBasicBackoff::new();

        tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let payload_size = publish.payload.len();
                        let msg = RawMessage {
                            topic: publish.topic.clone(),
                            payload: publish.payload.to_vec(),
                            payload_size,
                        };
                        match message_tx.try_send(msg) {
                            Ok(_) => {
                                queue_stats.increment_pending(payload_size);
                                backoff_strategy.reset();
                            }
                            Err(mpsc::error::TrySendError::Full(_)) => {
                                warn!(
                                    "message queue full, dropping message from topic: {}",
                                    publish.topic
                                );
                                queue_stats.increment_dropped(payload_size);
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => {
                                error!("message receiver has been dropped");
                                break;
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        backoff_strategy.reset();
                        let _ = status_tx.send(ConnectionEvent::Connected).await;
                    }
                    Ok(Event::Incoming(Packet::Disconnect))
                    | Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) => {
                        let _ = status_tx.send(ConnectionEvent::Closed).await;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("MQTT event loop connection error: {:?}", e);
                        queue_stats.increment_event_loop_errors();
                        let _ = status_tx.send(ConnectionEvent::Error(e.to_string())).await;

                        // Refresh credentials before reconnection attempt if a provider
                        // is configured, so the next connection uses a fresh token.
                        if let Some(ref provider) = credentials_provider {
                            match provider.get_credentials().await {
                                Ok(credentials) => {
                                    debug!("refreshed credentials for reconnection");
                                    event_loop
                                        .mqtt_options
                                        .set_credentials(credentials.username, credentials.password);
                                }
                                Err(cred_err) => {
                                    error!(
                                        "failed to refresh credentials for reconnection: {:?}",
                                        cred_err
                                    );
                                }
                            }
                        }

                        tokio::time::sleep(backoff_strategy.next_delay()).await;
                    }
                }
            }
        });

        info!("broker client started and processing messages");
        Ok((message_rx, status_rx))
    }

    pub async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), BrokerClientError> {
        self.client
            .subscribe(topic, qos)
            .await
            .map_err(BrokerClientError::ConnectionError)?;
        info!("subscribed to topic: {} (QoS: {:?})", topic, qos);
        Ok(())
    }

    pub async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerClientError> {
        self.publish_with_opts(
            topic,
            self.client_options
                .as_ref()
                .and_then(|opts| opts.publish_options),
            payload,
        )
        .await
    }

    pub async fn publish_with_opts(
        &self,
        topic: &str,
        publish_options: Option<PublishOptions>,
        payload: Vec<u8>,
    ) -> Result<(), BrokerClientError> {
        let payload_size = payload.len();

        let qos = publish_options
            .and_then(|opts| opts.qos)
            .or_else(|| {
                self.client_options
                    .as_ref()
                    .and_then(|client_opts| client_opts.publish_options)
                    .and_then(|opts| opts.qos)
            })
            .unwrap_or(DEFAULT_QOS);
        let retain = publish_options
            .and_then(|opts| opts.retain)
            .or_else(|| {
                self.client_options
                    .as_ref()
                    .and_then(|client_opts| client_opts.publish_options)
                    .and_then(|opts| opts.retain)
            })
            .unwrap_or(DEFAULT_RETAIN);

        match self.client.publish(topic, qos, retain, payload).await {
            Ok(_) => {
                self.publish_stats.increment_published(payload_size);
                debug!("published message to topic: {}", topic);
                Ok(())
            }
            Err(e) => {
                self.publish_stats.increment_failed();
                Err(BrokerClientError::ConnectionError(e))
            }
        }
    }

    pub async fn disconnect(&self) -> Result<(), BrokerClientError> {
        self.client
            .disconnect()
            .await
            .map_err(BrokerClientError::ConnectionError)?;
        info!("broker client disconnected");
        Ok(())
    }

    pub fn client_id(&self) -> String {
        self.client_id.clone()
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue_stats.to_stats()
    }

    pub fn publish_stats(&self) -> PublishStats {
        self.publish_stats.to_stats()
    }

    pub fn is_queue_empty(&self) -> bool {
        self.queue_stats.is_empty()
    }

    pub async fn wait_for_queue_empty(&self) {
        while !self.is_queue_empty() {
            tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
        }
    }

    pub fn reset_stats(&self) {
        self.queue_stats.reset_counters();
        self.publish_stats.reset_counters();
    }
}

// SuperBasicBackoff backs off event loop retries starting at 100ms,
// doubling up to a 30s ceiling.
struct SuperBasicBackoff {
    current: std::time::Duration,
    max: std::time::Duration,
}

impl SuperBasicBackoff {
    fn new() -> Self {
        Self {
            current: std::time::Duration::from_millis(100),
            max: std::time::Duration::from_secs(30),
        }
    }

    fn next_delay(&mut self) -> std::time::Duration {
        let delay = self.current;
        self.current = std::cmp::min(self.current * 2, self.max);
        warn!("event loop backoff updated: {}ms", delay.as_millis());
        delay
    }

    fn reset(&mut self) {
        self.current = std::time::Duration::from_millis(100);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_ceiling() {
        let mut backoff = SuperBasicBackoff::new();
        assert_eq!(backoff.next_delay(), std::time::Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), std::time::Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), std::time::Duration::from_millis(400));
        backoff.reset();
        assert_eq!(backoff.next_delay(), std::time::Duration::from_millis(100));
    }
}
