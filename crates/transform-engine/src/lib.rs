// SPDX-License-Identifier: Apache-2.0

//! Component D, the Transformation Engine (§4.4): matches incoming events
//! against the active rule set, runs each matched target's sandboxed
//! script, and republishes derived messages through the broker supervisor
//! (A) under ACL (H).

mod metrics;
mod template;

use std::sync::Arc;

use arc_swap::ArcSwap;
use broadcast_bus::BroadcastBus;
use broker_client::QoS;
use broker_supervisor::{BrokerSupervisor, PublishOutcome};
use sandbox::{Sandbox, SandboxDb, ScriptContext};
use serde_json::Value;
use tracing::{info, warn};
use uns_model::{BroadcastEnvelope, Event, Target, VersionedRuleSet};

pub use metrics::{BroadcastDecision, TransformMetrics, TransformMetricsSnapshot};

const SANDBOX_TIMEOUT_MS: u64 = 2000;
const SNIPPET_MAX_CHARS: usize = 200;

struct Inner {
    rule_set: ArcSwap<VersionedRuleSet>,
    sandbox: Sandbox,
    store: Option<store::Store>,
    supervisor: Arc<BrokerSupervisor>,
    bus: BroadcastBus,
    metrics: TransformMetrics,
}

/// Component D. Cheap to clone; every clone shares the same rule snapshot,
/// metrics table, and supervisor handle.
#[derive(Clone)]
pub struct TransformEngine {
    inner: Arc<Inner>,
}

impl TransformEngine {
    pub fn new(
        rule_set: VersionedRuleSet,
        store: Option<store::Store>,
        supervisor: Arc<BrokerSupervisor>,
        bus: BroadcastBus,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                rule_set: ArcSwap::from_pointee(rule_set),
                sandbox: Sandbox::new(std::time::Duration::from_millis(SANDBOX_TIMEOUT_MS)),
                store,
                supervisor,
                bus,
                metrics: TransformMetrics::new(),
            }),
        }
    }

    /// The store-need prefilter used by the message handler (B, §4.2 step
    /// 5): true iff any enabled target of a rule matching `topic` contains
    /// `await db`.
    pub fn rules_require_store(&self, topic: &str) -> bool {
        let snapshot = self.inner.rule_set.load();
        let Some(version) = snapshot.active_version() else {
            return false;
        };
        version.rules.iter().any(|rule| {
            topic_match::topic_matches(&rule.source_topic, topic)
                && rule
                    .targets
                    .iter()
                    .any(|t| t.enabled && t.references_store())
        })
    }

    /// `saveMappings(newConfig)` (§4.4): atomic swap of the active version,
    /// broadcast on G. Readers always see either the old or the new
    /// snapshot in full, never a torn read (§3 invariant).
    pub fn save_mappings(&self, new_config: VersionedRuleSet) {
        let active_version_id = new_config.active_version_id.clone();
        self.inner.rule_set.store(Arc::new(new_config));
        self.inner
            .bus
            .publish(BroadcastEnvelope::MapperConfigUpdate { active_version_id });
    }

    pub fn metrics_snapshot(&self) -> Vec<TransformMetricsSnapshot> {
        self.inner.metrics.snapshot()
    }

    /// Run every matched rule against `event`. Rules run in list order;
    /// a rule's own targets run concurrently (§4.4 "Matching").
    pub async fn handle_event(&self, event: &Event) {
        let payload = match event.payload_value() {
            Ok(v) => v,
            Err(e) => {
                warn!(topic = %event.topic, error = %e, "transform engine could not decode payload_text");
                return;
            }
        };

        let snapshot = self.inner.rule_set.load_full();
        let Some(version) = snapshot.active_version() else {
            return;
        };

        for rule in &version.rules {
            if !topic_match::topic_matches(&rule.source_topic, &event.topic) {
                continue;
            }

            let mut handles = Vec::with_capacity(rule.targets.len());
            for target in &rule.targets {
                if !target.enabled {
                    continue;
                }
                let engine = self.clone();
                let target = target.clone();
                let event = event.clone();
                let payload = payload.clone();
                handles.push(tokio::spawn(async move {
                    engine.run_target(&event, &target, payload).await;
                }));
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "transform target task panicked");
                }
            }
        }
    }

    async fn run_target(&self, event: &Event, target: &Target, payload: Value) {
        let db: Option<Arc<dyn SandboxDb>> = self
            .inner
            .store
            .clone()
            .map(|s| Arc::new(s) as Arc<dyn SandboxDb>);
        let ctx = ScriptContext {
            topic: event.topic.clone(),
            broker_id: event.broker_id.clone(),
            payload,
        };

        match self.inner.sandbox.run_transform(&target.code, ctx, db).await {
            Ok(None) => {
                let (decision, success_count) =
                    self.inner
                        .metrics
                        .record_debug(&event.topic, &target.id, "skipped (null result)".into());
                self.broadcast_metrics(decision, event, target, success_count, None);
            }
            Ok(Some(result)) => self.publish_result(event, target, result).await,
            Err(e) => self.record_and_broadcast_error(event, target, e.to_string()),
        }
    }

    async fn publish_result(&self, event: &Event, target: &Target, result: Value) {
        let payload = extract_payload(result);
        let output_topic =
            template::render_output_topic(&target.output_topic, &payload, &event.topic, &event.broker_id);
        let target_broker = target
            .target_broker_id
            .clone()
            .unwrap_or_else(|| event.broker_id.clone());

        let publish_bytes = if event.origin_is_sparkplug && output_topic.starts_with("spBv1.0/") {
            match sparkplug_codec::encode(&payload) {
                Ok(bytes) => bytes,
                Err(e) => {
                    self.record_and_broadcast_error(event, target, format!("sparkplug encode failed: {e}"));
                    return;
                }
            }
        } else {
            match serde_json::to_vec(&payload) {
                Ok(bytes) => bytes,
                Err(e) => {
                    self.record_and_broadcast_error(event, target, format!("payload encode failed: {e}"));
                    return;
                }
            }
        };

        let outcome = self
            .inner
            .supervisor
            .publish(&target_broker, &output_topic, publish_bytes, QoS::AtLeastOnce, false)
            .await;

        match outcome {
            Ok(PublishOutcome::Accepted) => {
                info!(target_id = %target.id, topic = %output_topic, "transform published derived message");
                let snippet = truncate_snippet(&payload.to_string());
                let (decision, success_count) = self.inner.metrics.record_success(
                    &event.topic,
                    &target.id,
                    output_topic.clone(),
                    snippet.clone(),
                );
                self.inner.bus.publish(BroadcastEnvelope::MappedTopicGenerated {
                    topic: output_topic,
                    broker_id: target_broker,
                });
                self.broadcast_metrics(decision, event, target, success_count, Some(snippet));
            }
            Ok(PublishOutcome::RejectedByAcl) => {
                self.record_and_broadcast_error(
                    event,
                    target,
                    format!("broker '{target_broker}' does not allow publishing to '{output_topic}'"),
                );
            }
            Ok(PublishOutcome::NoConnection) => {
                self.record_and_broadcast_error(
                    event,
                    target,
                    format!("no connection to broker '{target_broker}'"),
                );
            }
            Ok(PublishOutcome::SendError(detail)) => {
                self.record_and_broadcast_error(event, target, detail);
            }
            Err(e) => self.record_and_broadcast_error(event, target, e.to_string()),
        }
    }

    fn record_and_broadcast_error(&self, event: &Event, target: &Target, message: String) {
        warn!(target_id = %target.id, topic = %event.topic, error = %message, "transform target failed");
        let success_count = self.inner.metrics.record_error(&event.topic, &target.id, message.clone());
        self.broadcast_metrics(BroadcastDecision::Immediate, event, target, success_count, Some(message));
    }

    fn broadcast_metrics(
        &self,
        decision: BroadcastDecision,
        event: &Event,
        target: &Target,
        success_count: u64,
        entry: Option<String>,
    ) {
        if matches!(decision, BroadcastDecision::Suppressed) {
            return;
        }
        self.inner.bus.publish(BroadcastEnvelope::MapperMetricsUpdate {
            source_topic: event.topic.clone(),
            target_id: target.id.clone(),
            success_count,
            entry,
        });
    }
}

impl persistence::TransformReplay for TransformEngine {
    /// Post-commit replay from C (§4.3, §8.4): run detached so the
    /// persistence worker's drain loop is never blocked on a transform.
    fn replay(&self, event: Event) {
        let engine = self.clone();
        tokio::spawn(async move {
            engine.handle_event(&event).await;
        });
    }
}

/// A target's script is documented to return the mutated `msg` object
/// (`{topic, brokerId, payload}`); tolerate scripts that return the bare
/// payload directly too.
fn extract_payload(result: Value) -> Value {
    match result {
        Value::Object(ref map) if map.contains_key("payload") => map["payload"].clone(),
        other => other,
    }
}

fn truncate_snippet(text: &str) -> String {
    if text.chars().count() <= SNIPPET_MAX_CHARS {
        text.to_string()
    } else {
        text.chars().take(SNIPPET_MAX_CHARS).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uns_model::rules::{Rule, Version};

    fn rule_set(rules: Vec<Rule>) -> VersionedRuleSet {
        VersionedRuleSet {
            versions: vec![Version {
                id: "v1".into(),
                name: "v1".into(),
                created_at: Utc::now(),
                rules,
            }],
            active_version_id: "v1".into(),
        }
    }

    fn stateless_rule() -> Rule {
        Rule {
            source_topic: "line1/+/temp".into(),
            targets: vec![Target {
                id: "t1".into(),
                enabled: true,
                output_topic: "line1/{{cell}}/tempF".into(),
                target_broker_id: None,
                code: "msg.payload.tempF = msg.payload.tempC*9/5+32; return msg;".into(),
            }],
        }
    }

    fn engine_with(rules: Vec<Rule>) -> TransformEngine {
        let supervisor = Arc::new(BrokerSupervisor::new(BroadcastBus::new()));
        TransformEngine::new(rule_set(rules), None, supervisor, BroadcastBus::new())
    }

    #[tokio::test]
    async fn stateless_transform_runs_with_no_publish_target() {
        // No broker configured: supervisor.publish fails fast with
        // UnknownBroker, which this test asserts surfaces as a recorded
        // error rather than a panic.
        let engine = engine_with(vec![stateless_rule()]);
        let event = Event::new(
            "b1",
            "line1/a/temp",
            Utc::now(),
            r#"{"cell":"a","tempC":100}"#,
            false,
        );
        engine.handle_event(&event).await;

        let snap = engine.metrics_snapshot();
        let row = snap.iter().find(|r| r.target_id == "t1").unwrap();
        assert_eq!(row.success_count, 0);
        assert!(row.entries.iter().any(|e| e.error.is_some()));
    }

    #[test]
    fn rules_require_store_detects_sentinel() {
        let rule = Rule {
            source_topic: "s/1".into(),
            targets: vec![Target {
                id: "t1".into(),
                enabled: true,
                output_topic: "x".into(),
                target_broker_id: None,
                code: "const r = await db.get(\"SELECT 1\"); return msg;".into(),
            }],
        };
        let engine = engine_with(vec![rule]);
        assert!(engine.rules_require_store("s/1"));
        assert!(!engine.rules_require_store("s/2"));
    }

    #[test]
    fn save_mappings_swaps_active_version_atomically() {
        let engine = engine_with(vec![]);
        let mut new_set = rule_set(vec![stateless_rule()]);
        new_set.active_version_id = "v1".into();
        engine.save_mappings(new_set);
        assert!(!engine.rules_require_store("line1/a/temp"));
    }

    #[tokio::test]
    async fn acl_denied_publish_records_error_mentioning_acl() {
        let supervisor = Arc::new(BrokerSupervisor::new(BroadcastBus::new()));
        supervisor
            .add_broker(uns_model::BrokerConfig {
                id: "b1".into(),
                host: "127.0.0.1".into(),
                port: 1883,
                client_id: None,
                username: None,
                password: None,
                subscribe: vec![],
                publish: vec!["a/#".into()],
                tls: uns_model::broker::TlsMode::None,
                reject_unauthorized: true,
            })
            .await
            .unwrap();

        let rule = Rule {
            source_topic: "src/x".into(),
            targets: vec![Target {
                id: "t1".into(),
                enabled: true,
                output_topic: "b/x".into(),
                target_broker_id: Some("b1".into()),
                code: "return msg;".into(),
            }],
        };
        let engine = TransformEngine::new(rule_set(vec![rule]), None, supervisor, BroadcastBus::new());
        let event = Event::new("b1", "src/x", Utc::now(), "{}", false);
        engine.handle_event(&event).await;

        let snap = engine.metrics_snapshot();
        let row = snap.iter().find(|r| r.target_id == "t1").unwrap();
        assert!(
            row.entries
                .iter()
                .any(|e| e.error.as_deref().is_some_and(|m| m.contains("does not allow publishing")))
        );
    }
}
