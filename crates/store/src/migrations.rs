// SPDX-License-Identifier: Apache-2.0

//! Schema creation and migration, run once at startup (§4.6).

use duckdb::Connection;
use tracing::info;

use crate::errors::StoreResult;

const DEFAULT_BROKER_ID: &str = "default_broker";

pub fn run(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS mqtt_events (
            timestamp TIMESTAMPTZ NOT NULL,
            topic VARCHAR NOT NULL,
            payload JSON NOT NULL,
            broker_id VARCHAR NOT NULL
        );
        CREATE INDEX IF NOT EXISTS mqtt_events_topic_ts ON mqtt_events (topic, timestamp);

        CREATE TABLE IF NOT EXISTS alert_rules (
            id VARCHAR PRIMARY KEY,
            name VARCHAR NOT NULL,
            owner_id VARCHAR NOT NULL,
            topic_pattern VARCHAR NOT NULL,
            condition_code VARCHAR NOT NULL,
            severity VARCHAR NOT NULL,
            workflow_prompt VARCHAR,
            notifications JSON NOT NULL,
            enabled BOOLEAN NOT NULL
        );

        CREATE TABLE IF NOT EXISTS active_alerts (
            id VARCHAR PRIMARY KEY,
            rule_id VARCHAR NOT NULL,
            topic VARCHAR NOT NULL,
            broker_id VARCHAR NOT NULL,
            trigger_value VARCHAR NOT NULL,
            status VARCHAR NOT NULL,
            handled_by VARCHAR,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            analysis_result VARCHAR
        );
        CREATE INDEX IF NOT EXISTS active_alerts_rule_topic ON active_alerts (rule_id, topic);",
    )?;

    backfill_broker_id(conn)?;
    Ok(())
}

/// `mqtt_events` has always carried `broker_id` since this schema is new, but
/// a store opened against a database file written before broker attribution
/// existed would not. Add the column and backfill it rather than fail to
/// open (§4.6).
fn backfill_broker_id(conn: &Connection) -> StoreResult<()> {
    let has_column: bool = conn.query_row(
        "SELECT count(*) > 0 FROM information_schema.columns \
         WHERE table_name = 'mqtt_events' AND column_name = 'broker_id'",
        [],
        |row| row.get(0),
    )?;

    if !has_column {
        info!("migrating mqtt_events: adding broker_id column");
        conn.execute_batch(&format!(
            "ALTER TABLE mqtt_events ADD COLUMN broker_id VARCHAR DEFAULT '{DEFAULT_BROKER_ID}';
             UPDATE mqtt_events SET broker_id = '{DEFAULT_BROKER_ID}' WHERE broker_id IS NULL;"
        ))?;
    }

    Ok(())
}
