// SPDX-License-Identifier: Apache-2.0

// src/lib.rs
// Per-broker MQTT connection lifecycle: the transport half of component A
// (Broker Supervisor). Owns one rumqttc connection per broker_id, exposes
// raw (topic, bytes) publishes upstream, and surfaces connection lifecycle
// as `ConnectionEvent`s for the supervisor's status state machine.

pub mod auth;
pub mod client;
pub mod errors;
pub mod stats;

pub use auth::{
    CredentialsProvider, OAuth2Config, OAuth2TokenProvider, StaticCredentials,
    TokenCredentialsProvider, TokenProvider,
};
pub use client::{BrokerClient, ClientOptions, ConnectionEvent, PublishOptions, RawMessage};
pub use errors::BrokerClientError;
pub use rumqttc::QoS;
pub use stats::{PublishStats, QueueStats};
