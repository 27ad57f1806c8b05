// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alert::ActiveAlert;
use crate::broker::BrokerStatus;

/// Every JSON envelope type the core pushes onto the broadcast bus (§4.7).
///
/// `#[serde(tag = "type")]` makes the wire shape match the spec's
/// `{type: "...", ...}` description directly.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BroadcastEnvelope {
    MqttMessage {
        broker_id: String,
        topic: String,
        payload_text: String,
        timestamp: DateTime<Utc>,
    },
    BrokerStatus {
        #[serde(flatten)]
        status: BrokerStatus,
    },
    BrokerStatusAll {
        statuses: Vec<BrokerStatus>,
    },
    MapperConfigUpdate {
        active_version_id: String,
    },
    MapperMetricsUpdate {
        source_topic: String,
        target_id: String,
        success_count: u64,
        entry: Option<String>,
    },
    MappedTopicGenerated {
        topic: String,
        broker_id: String,
    },
    AlertTriggered {
        alert: ActiveAlert,
    },
    DbStatusUpdate {
        healthy: bool,
        detail: Option<String>,
    },
    PruningStatus {
        rows_deleted: u64,
    },
    DbBounds {
        oldest: Option<DateTime<Utc>>,
        newest: Option<DateTime<Utc>>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mqtt_message_serializes_with_type_tag() {
        let env = BroadcastEnvelope::MqttMessage {
            broker_id: "b1".into(),
            topic: "a/b".into(),
            payload_text: "{}".into(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["type"], "mqtt-message");
    }
}
