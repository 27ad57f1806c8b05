// SPDX-License-Identifier: Apache-2.0

//! Component E, the Alert Engine (§4.5): evaluates every live event
//! against the enabled alert rules, dedupes against the active-alerts
//! table, persists new triggers, and runs the notification workflow.

mod errors;

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use broadcast_bus::BroadcastBus;
use chrono::Utc;
use regex::Regex;
use sandbox::{Sandbox, SandboxDb, ScriptContext};
use tracing::{info, warn};
use uns_model::alert::{truncate_snippet, ActiveAlert, AlertRule, AlertStatus};
use uns_model::{BroadcastEnvelope, Event};

pub use errors::AlertError;

const SANDBOX_TIMEOUT_MS: u64 = 1000;
const SNIPPET_MAX_CHARS: usize = 200;
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

struct CompiledRule {
    rule: AlertRule,
    regex: Regex,
}

struct Inner {
    rules: ArcSwap<Vec<CompiledRule>>,
    store: store::Store,
    bus: BroadcastBus,
    sandbox: Sandbox,
    http: reqwest::Client,
    /// Whether an LLM key is configured; gates the `workflow_prompt`
    /// auto-analysis transition (§4.5 "Workflow"). The analysis itself is
    /// out of core scope.
    llm_configured: bool,
}

/// Component E. Cheap to clone.
#[derive(Clone)]
pub struct AlertEngine {
    inner: Arc<Inner>,
}

impl AlertEngine {
    pub fn new(store: store::Store, bus: BroadcastBus, llm_configured: bool) -> Self {
        let http = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .expect("reqwest client with a fixed timeout always builds");

        Self {
            inner: Arc::new(Inner {
                rules: ArcSwap::from_pointee(Vec::new()),
                store,
                bus,
                sandbox: Sandbox::new(Duration::from_millis(SANDBOX_TIMEOUT_MS)),
                http,
                llm_configured,
            }),
        }
    }

    /// Load enabled alert rules from the store and compile their
    /// `topic_pattern`s. Call at startup and after any rule edit.
    pub async fn reload_rules(&self) -> Result<(), AlertError> {
        let rules = self.inner.store.list_enabled_alert_rules().await?;
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            let regex = topic_match::pattern_to_regex(&rule.topic_pattern)
                .map_err(|e| AlertError::BadPattern(rule.topic_pattern.clone(), e))?;
            compiled.push(CompiledRule { rule, regex });
        }
        self.inner.rules.store(Arc::new(compiled));
        Ok(())
    }

    /// Fire-and-forget entry point for the message handler (B, §4.2 step
    /// 6: "Invoke E asynchronously").
    pub fn handle_event_detached(&self, event: Event) {
        let engine = self.clone();
        tokio::spawn(async move {
            engine.handle_event(&event).await;
        });
    }

    pub async fn handle_event(&self, event: &Event) {
        let payload = match event.payload_value() {
            Ok(v) => v,
            Err(e) => {
                warn!(topic = %event.topic, error = %e, "alert engine could not decode payload_text");
                return;
            }
        };

        let rules = self.inner.rules.load_full();
        for compiled in rules.iter() {
            if !compiled.regex.is_match(&event.topic) {
                continue;
            }
            self.evaluate_rule(event, &payload, &compiled.rule).await;
        }
    }

    async fn evaluate_rule(&self, event: &Event, payload: &serde_json::Value, rule: &AlertRule) {
        let db: Arc<dyn SandboxDb> = Arc::new(self.inner.store.clone());
        let ctx = ScriptContext {
            topic: event.topic.clone(),
            broker_id: event.broker_id.clone(),
            payload: payload.clone(),
        };

        let triggered = match self
            .inner
            .sandbox
            .run_predicate(&rule.condition_code, ctx, Some(db))
            .await
        {
            Ok(triggered) => triggered,
            Err(e) => {
                warn!(rule_id = %rule.id, error = %e, "alert condition failed");
                return;
            }
        };

        if !triggered {
            return;
        }

        let now = Utc::now();
        let alert = ActiveAlert {
            id: uuid::Uuid::new_v4().to_string(),
            rule_id: rule.id.clone(),
            topic: event.topic.clone(),
            broker_id: event.broker_id.clone(),
            trigger_value: truncate_snippet(&event.payload_text, SNIPPET_MAX_CHARS),
            status: AlertStatus::New,
            handled_by: None,
            created_at: now,
            updated_at: now,
            analysis_result: None,
        };

        match self.inner.store.trigger_alert_if_not_active(alert).await {
            Ok(Some(triggered)) => {
                info!(rule_id = %rule.id, topic = %event.topic, alert_id = %triggered.id, "alert triggered");
                self.inner
                    .bus
                    .publish(BroadcastEnvelope::AlertTriggered { alert: triggered.clone() });
                self.run_workflow(rule, &triggered).await;
            }
            Ok(None) => {
                // An active, non-resolved alert for (rule_id, topic)
                // already exists (§4.5/§8.7 dedupe).
            }
            Err(e) => warn!(rule_id = %rule.id, error = %e, "failed to persist triggered alert"),
        }
    }

    async fn run_workflow(&self, rule: &AlertRule, alert: &ActiveAlert) {
        if let Some(webhook) = &rule.notifications.webhook {
            let summary = serde_json::json!({
                "alertId": alert.id,
                "ruleId": rule.id,
                "ruleName": rule.name,
                "severity": rule.severity.as_str(),
                "topic": alert.topic,
                "brokerId": alert.broker_id,
                "triggerValue": alert.trigger_value,
                "createdAt": alert.created_at,
            });
            if let Err(e) = self.inner.http.post(webhook).json(&summary).send().await {
                warn!(rule_id = %rule.id, webhook = %webhook, error = %e, "alert webhook notification failed");
            }
        }

        if rule.workflow_prompt.is_some() && self.inner.llm_configured {
            if let Err(e) = self
                .inner
                .store
                .update_alert_status(&alert.id, AlertStatus::Analyzing, Some("System (AI)".to_string()))
                .await
            {
                warn!(alert_id = %alert.id, error = %e, "failed to transition alert to analyzing");
            }
        }
    }

    /// `updateAlertStatus(id, status, handler)` (§4.5 "User lifecycle
    /// actions"). The allowed status set is exactly `AlertStatus`'s
    /// variants, enforced by the type itself.
    pub async fn update_alert_status(
        &self,
        id: impl Into<String>,
        status: AlertStatus,
        handler: impl Into<String>,
    ) -> Result<ActiveAlert, AlertError> {
        Ok(self
            .inner
            .store
            .update_alert_status(id, status, Some(handler.into()))
            .await?)
    }

    /// `purgeResolved()` (§4.5 "Retention").
    pub async fn purge_resolved(&self) -> Result<u64, AlertError> {
        Ok(self.inner.store.purge_resolved().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uns_model::alert::NotificationTargets;

    fn door_rule(webhook: Option<String>) -> AlertRule {
        AlertRule {
            id: "r1".into(),
            name: "door open".into(),
            owner_id: "global".into(),
            topic_pattern: "door/+/state".into(),
            condition_code: "return msg.payload.state === 'open';".into(),
            severity: uns_model::alert::AlertSeverity::Warning,
            workflow_prompt: None,
            notifications: NotificationTargets { webhook, email: None },
            enabled: true,
        }
    }

    async fn engine_with_rule(rule: AlertRule) -> AlertEngine {
        let store = store::Store::open_in_memory().unwrap();
        store.insert_alert_rule(rule).await.unwrap();
        let engine = AlertEngine::new(store, BroadcastBus::new(), false);
        engine.reload_rules().await.unwrap();
        engine
    }

    #[tokio::test]
    async fn matching_open_event_triggers_alert() {
        let engine = engine_with_rule(door_rule(None)).await;
        let event = Event::new("b1", "door/1/state", Utc::now(), r#"{"state":"open"}"#, false);
        engine.handle_event(&event).await;

        let active = engine
            .inner
            .store
            .query_all("SELECT * FROM active_alerts")
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn repeated_triggers_dedupe_while_active() {
        let engine = engine_with_rule(door_rule(None)).await;
        let event = Event::new("b1", "door/1/state", Utc::now(), r#"{"state":"open"}"#, false);
        engine.handle_event(&event).await;
        engine.handle_event(&event).await;

        let active = engine
            .inner
            .store
            .query_all("SELECT * FROM active_alerts")
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn non_matching_topic_is_ignored() {
        let engine = engine_with_rule(door_rule(None)).await;
        let event = Event::new("b1", "window/1/state", Utc::now(), r#"{"state":"open"}"#, false);
        engine.handle_event(&event).await;

        let active = engine
            .inner
            .store
            .query_all("SELECT * FROM active_alerts")
            .await
            .unwrap();
        assert!(active.is_empty());
    }

    #[tokio::test]
    async fn retrigger_allowed_after_resolution() {
        let engine = engine_with_rule(door_rule(None)).await;
        let event = Event::new("b1", "door/1/state", Utc::now(), r#"{"state":"open"}"#, false);
        engine.handle_event(&event).await;

        let active = engine
            .inner
            .store
            .query_all("SELECT id FROM active_alerts")
            .await
            .unwrap();
        let id = active[0]["id"].as_str().unwrap().to_string();
        engine
            .update_alert_status(id, AlertStatus::Resolved, "operator")
            .await
            .unwrap();

        engine.handle_event(&event).await;

        let active = engine
            .inner
            .store
            .query_all("SELECT * FROM active_alerts WHERE status != 'resolved'")
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
    }
}
