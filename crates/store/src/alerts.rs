// SPDX-License-Identifier: Apache-2.0

//! `alert_rules` and `active_alerts` tables (§3, §4.5, §6).

use chrono::{DateTime, Utc};
use duckdb::Connection;
use uns_model::alert::{ActiveAlert, AlertRule, AlertSeverity, AlertStatus, NotificationTargets};

use crate::errors::{StoreError, StoreResult};

pub fn insert_alert_rule(conn: &Connection, rule: &AlertRule) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO alert_rules
            (id, name, owner_id, topic_pattern, condition_code, severity, workflow_prompt, notifications, enabled)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (id) DO UPDATE SET
            name = excluded.name, owner_id = excluded.owner_id, topic_pattern = excluded.topic_pattern,
            condition_code = excluded.condition_code, severity = excluded.severity,
            workflow_prompt = excluded.workflow_prompt, notifications = excluded.notifications,
            enabled = excluded.enabled",
        duckdb::params![
            rule.id,
            rule.name,
            rule.owner_id,
            rule.topic_pattern,
            rule.condition_code,
            rule.severity.as_str(),
            rule.workflow_prompt,
            serde_json::to_string(&rule.notifications).unwrap_or_default(),
            rule.enabled,
        ],
    )?;
    Ok(())
}

/// Every enabled rule, regardless of owner — matching against the live
/// stream is owner-agnostic; ownership only gates the (out-of-core) UI.
pub fn list_enabled_alert_rules(conn: &Connection) -> StoreResult<Vec<AlertRule>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, owner_id, topic_pattern, condition_code, severity, workflow_prompt, notifications, enabled
         FROM alert_rules WHERE enabled = true",
    )?;
    let rows = stmt.query_map([], row_to_alert_rule)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

fn row_to_alert_rule(row: &duckdb::Row) -> duckdb::Result<AlertRule> {
    let severity: String = row.get(5)?;
    let notifications: String = row.get(7)?;
    Ok(AlertRule {
        id: row.get(0)?,
        name: row.get(1)?,
        owner_id: row.get(2)?,
        topic_pattern: row.get(3)?,
        condition_code: row.get(4)?,
        severity: AlertSeverity::parse(&severity).unwrap_or(AlertSeverity::Info),
        workflow_prompt: row.get(6)?,
        notifications: serde_json::from_str::<NotificationTargets>(&notifications).unwrap_or_default(),
        enabled: row.get(8)?,
    })
}

/// The dedupe check (§4.5, §8.7): is there already a non-resolved active
/// alert for this `(rule_id, topic)`?
pub fn find_active_non_resolved(
    conn: &Connection,
    rule_id: &str,
    topic: &str,
) -> StoreResult<Option<ActiveAlert>> {
    let mut stmt = conn.prepare(
        "SELECT id, rule_id, topic, broker_id, trigger_value, status, handled_by, created_at, updated_at, analysis_result
         FROM active_alerts WHERE rule_id = ? AND topic = ? AND status != 'resolved' LIMIT 1",
    )?;
    let mut rows = stmt.query_map(duckdb::params![rule_id, topic], row_to_active_alert)?;
    rows.next().transpose().map_err(Into::into)
}

pub fn insert_active_alert(conn: &Connection, alert: &ActiveAlert) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO active_alerts
            (id, rule_id, topic, broker_id, trigger_value, status, handled_by, created_at, updated_at, analysis_result)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        duckdb::params![
            alert.id,
            alert.rule_id,
            alert.topic,
            alert.broker_id,
            alert.trigger_value,
            alert.status.as_str(),
            alert.handled_by,
            alert.created_at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            alert.updated_at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            alert.analysis_result,
        ],
    )?;
    Ok(())
}

/// `updateAlertStatus(id, status, handler)` (§4.5).
pub fn update_alert_status(
    conn: &Connection,
    id: &str,
    status: AlertStatus,
    handled_by: Option<&str>,
    now: DateTime<Utc>,
) -> StoreResult<ActiveAlert> {
    let updated = conn.execute(
        "UPDATE active_alerts SET status = ?, handled_by = ?, updated_at = ? WHERE id = ?",
        duckdb::params![
            status.as_str(),
            handled_by,
            now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            id,
        ],
    )?;
    if updated == 0 {
        return Err(StoreError::UnknownActiveAlert(id.to_string()));
    }

    let mut stmt = conn.prepare(
        "SELECT id, rule_id, topic, broker_id, trigger_value, status, handled_by, created_at, updated_at, analysis_result
         FROM active_alerts WHERE id = ?",
    )?;
    stmt.query_row(duckdb::params![id], row_to_active_alert)
        .map_err(Into::into)
}

/// `purgeResolved()` (§4.5): delete and compact.
pub fn purge_resolved(conn: &Connection) -> StoreResult<u64> {
    let deleted = conn.execute("DELETE FROM active_alerts WHERE status = 'resolved'", [])?;
    Ok(deleted as u64)
}

fn row_to_active_alert(row: &duckdb::Row) -> duckdb::Result<ActiveAlert> {
    let status: String = row.get(5)?;
    Ok(ActiveAlert {
        id: row.get(0)?,
        rule_id: row.get(1)?,
        topic: row.get(2)?,
        broker_id: row.get(3)?,
        trigger_value: row.get(4)?,
        status: AlertStatus::parse(&status).unwrap_or(AlertStatus::New),
        handled_by: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        analysis_result: row.get(9)?,
    })
}
