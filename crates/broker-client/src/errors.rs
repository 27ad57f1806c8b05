// SPDX-License-Identifier: Apache-2.0

// src/errors.rs
// Error types for the broker client.

use thiserror::Error;

// BrokerClientError covers all possible error conditions in the
// MQTT client. Each variant provides specific context about what
// went wrong and why, or it should, at least.
#[derive(Error, Debug)]
pub enum BrokerClientError {
    // ConnectionError occurs when MQTT broker communication fails
    // (network issues, auth failures).
    #[error("MQTT connection error: {0}")]
    ConnectionError(#[from] rumqttc::ClientError),
    // UnknownBroker occurs when a caller addresses a broker_id the
    // supervisor has no client for.
    #[error("unknown broker: {0}")]
    UnknownBroker(String),
    // AlreadyStartedError occurs when connect() has already
    // been called on the client.
    #[error("already started error: connect() has already been called on the client")]
    AlreadyStartedError,
    // CredentialsError occurs when fetching credentials from a provider fails.
    #[error("credentials provider error: {0}")]
    CredentialsError(String),
    // PublishDenied occurs when a publish is rejected by the ACL matcher (H).
    #[error("publish to topic '{0}' denied by ACL")]
    PublishDenied(String),
}

impl BrokerClientError {
    // Create a CredentialsError.
    pub fn credentials_error(message: impl Into<String>) -> Self {
        Self::CredentialsError(message.into())
    }

    // Create an UnknownBroker error.
    pub fn unknown_broker(broker_id: impl Into<String>) -> Self {
        Self::UnknownBroker(broker_id.into())
    }

    // Check if this error is related to network connectivity.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::ConnectionError(_))
    }

    // Check if this error is related to credentials.
    pub fn is_credentials_error(&self) -> bool {
        matches!(self, Self::CredentialsError(_))
    }
}
