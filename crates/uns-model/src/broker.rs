// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// One configured MQTT broker. Loaded at start, immutable during a run
/// (§3 Broker Config).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub id: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Topic patterns (`+`/`#` wildcards allowed) subscribed at QoS 1 once
    /// connected.
    #[serde(default)]
    pub subscribe: Vec<String>,
    /// Allow-patterns for outbound publish. Empty means deny-all / read-only
    /// (§4.8).
    #[serde(default)]
    pub publish: Vec<String>,
    #[serde(default)]
    pub tls: TlsMode,
    /// Test-only escape hatch; a `false` value is logged loudly at startup
    /// (§4.1).
    #[serde(default = "default_true")]
    pub reject_unauthorized: bool,
}

fn default_true() -> bool {
    true
}

/// The three TLS postures §4.1 calls out.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TlsMode {
    #[default]
    None,
    ServerVerify {
        ca_path: String,
    },
    Mutual {
        ca_path: String,
        client_cert_path: String,
        client_key_path: String,
    },
}

/// `{connecting, connected, offline, disconnected, error}` plus the terminal
/// `shutting_down` state from §4.1's state machine.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerStatusKind {
    Connecting,
    Connected,
    Offline,
    Disconnected,
    Error,
    ShuttingDown,
}

/// A broker status transition, with the monotonic sequence number §3
/// requires so subscribers can detect out-of-order delivery over G.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BrokerStatus {
    pub broker_id: String,
    pub status: BrokerStatusKind,
    pub last_error: Option<String>,
    pub sequence: u64,
}

/// Issues monotonically increasing sequence numbers for one broker's status
/// transitions. Each broker owns exactly one of these.
#[derive(Debug, Default)]
pub struct StatusSequencer(AtomicU64);

impl StatusSequencer {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// Convenience constructor tying a status kind + sequencer together.
impl BrokerStatus {
    pub fn new(
        broker_id: impl Into<String>,
        status: BrokerStatusKind,
        last_error: Option<String>,
        sequencer: &StatusSequencer,
    ) -> Self {
        Self {
            broker_id: broker_id.into(),
            status,
            last_error,
            sequence: sequencer.next(),
        }
    }
}

/// The (out-of-core, timezone-aware) timestamp of the status change, kept
/// separate from `BrokerStatus` since G only needs the latter on the wire.
pub type StatusTimestamp = DateTime<Utc>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_sequencer_is_monotonic() {
        let seq = StatusSequencer::new();
        assert_eq!(seq.next(), 0);
        assert_eq!(seq.next(), 1);
        assert_eq!(seq.next(), 2);
    }

    #[test]
    fn broker_config_defaults_publish_to_empty() {
        let json = r#"{"id":"b1","host":"localhost","port":1883}"#;
        let cfg: BrokerConfig = serde_json::from_str(json).unwrap();
        assert!(cfg.publish.is_empty());
        assert!(cfg.reject_unauthorized);
        assert!(matches!(cfg.tls, TlsMode::None));
    }
}
