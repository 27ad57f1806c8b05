// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-level transform rule set, as persisted to / loaded from disk (§3, §6).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VersionedRuleSet {
    pub versions: Vec<Version>,
    pub active_version_id: String,
}

impl VersionedRuleSet {
    /// The single active version. Invariant (§3): exactly one active version
    /// exists at any time, so in a well-formed rule set this never returns
    /// `None` — callers that can't rely on that (e.g. right after a bad load)
    /// should treat `None` as a fatal startup condition.
    pub fn active_version(&self) -> Option<&Version> {
        self.versions
            .iter()
            .find(|v| v.id == self.active_version_id)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Version {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub rules: Vec<Rule>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Rule {
    pub source_topic: String,
    pub targets: Vec<Target>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    pub enabled: bool,
    /// Template with `{{placeholder}}` substitution against
    /// `{...payload, topic, brokerId}` (§3).
    pub output_topic: String,
    #[serde(default)]
    pub target_broker_id: Option<String>,
    pub code: String,
}

impl Target {
    /// The store-need prefilter (§4.2 step 5 / §4.4): a conservative,
    /// inexpensive lexical check for the sentinel `await db`, after
    /// whitespace normalization.
    pub fn references_store(&self) -> bool {
        let normalized: String = self.code.split_whitespace().collect::<Vec<_>>().join(" ");
        normalized.contains("await db")
    }
}

/// One entry in a target's bounded metrics ring (§3: `N = 20`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransformMetricsEntry {
    pub ts: DateTime<Utc>,
    pub in_topic: String,
    pub out_topic: Option<String>,
    pub out_payload_snippet: Option<String>,
    pub error: Option<String>,
    pub debug: Option<String>,
}

impl TransformMetricsEntry {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule_set_with(active: &str) -> VersionedRuleSet {
        VersionedRuleSet {
            versions: vec![Version {
                id: active.to_string(),
                name: "v1".into(),
                created_at: Utc::now(),
                rules: vec![],
            }],
            active_version_id: active.to_string(),
        }
    }

    #[test]
    fn active_version_found() {
        let set = rule_set_with("v1");
        assert_eq!(set.active_version().unwrap().id, "v1");
    }

    #[test]
    fn active_version_missing_returns_none() {
        let mut set = rule_set_with("v1");
        set.active_version_id = "missing".into();
        assert!(set.active_version().is_none());
    }

    #[test]
    fn references_store_detects_sentinel_despite_whitespace() {
        let target = Target {
            id: "t1".into(),
            enabled: true,
            output_topic: "x".into(),
            target_broker_id: None,
            code: "const r =   await   db.get(\"SELECT 1\"); return msg;".into(),
        };
        assert!(target.references_store());
    }

    #[test]
    fn references_store_false_for_stateless_code() {
        let target = Target {
            id: "t1".into(),
            enabled: true,
            output_topic: "x".into(),
            target_broker_id: None,
            code: "msg.payload.tempF = msg.payload.tempC*9/5+32; return msg;".into(),
        };
        assert!(!target.references_store());
    }
}
