// SPDX-License-Identifier: Apache-2.0

//! Component F, the Store Interface (§4.6): an embedded, append-only,
//! transactional event store plus the `alert_rules`/`active_alerts` tables
//! E owns. Backed by DuckDB (`duckdb` crate) rather than the teacher's
//! Postgres/`sqlx` stack, since this store is an embedded single-process
//! columnar file, not a networked relational service — see `DESIGN.md`.
//!
//! `duckdb::Connection` is `Send` but not `Sync`, so every operation runs
//! inside `tokio::task::spawn_blocking` against a connection guarded by a
//! plain `std::sync::Mutex` that is never held across an `.await`.

mod alerts;
mod errors;
mod events;
mod maintenance;
mod migrations;

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use duckdb::Connection;
use tracing::{info, warn};
use uns_model::alert::{ActiveAlert, AlertRule, AlertStatus};
use uns_model::{BroadcastEnvelope, Event};

pub use errors::{StoreError, StoreResult};
pub use events::BatchInsertOutcome;

/// Component F. Cheap to clone; every clone shares the same underlying
/// connection and file.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (creating if absent) the DuckDB file at `path` and run schema
    /// migrations (§4.6).
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        migrations::run(&conn)?;
        info!(path = %path.as_ref().display(), "store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// An in-memory store, used by tests and anywhere durability across
    /// restarts isn't required.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert a batch inside one transaction (§4.3). Called by `persistence`
    /// after it has drained its queue.
    pub async fn insert_batch(&self, batch: Vec<Event>) -> StoreResult<BatchInsertOutcome> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().unwrap();
            events::insert_batch(&mut conn, &batch)
        })
        .await?
    }

    /// `db.all(sql)` (§4.4): every matching row as a JSON object.
    pub async fn query_all(&self, sql: impl Into<String>) -> StoreResult<Vec<serde_json::Value>> {
        let conn = self.conn.clone();
        let sql = sql.into();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            events::query_all(&conn, &sql)
        })
        .await?
    }

    /// `db.get(sql)`: the first row only.
    pub async fn query_one(&self, sql: impl Into<String>) -> StoreResult<Option<serde_json::Value>> {
        let conn = self.conn.clone();
        let sql = sql.into();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            events::query_one(&conn, &sql)
        })
        .await?
    }

    pub async fn insert_alert_rule(&self, rule: AlertRule) -> StoreResult<()> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            alerts::insert_alert_rule(&conn, &rule)
        })
        .await?
    }

    pub async fn list_enabled_alert_rules(&self) -> StoreResult<Vec<AlertRule>> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            alerts::list_enabled_alert_rules(&conn)
        })
        .await?
    }

    /// Dedupe check + insert, performed under the same connection lock so a
    /// concurrent trigger for the same `(rule_id, topic)` cannot race
    /// between the check and the insert (§4.5, §8.7).
    pub async fn trigger_alert_if_not_active(
        &self,
        alert: ActiveAlert,
    ) -> StoreResult<Option<ActiveAlert>> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            if alerts::find_active_non_resolved(&conn, &alert.rule_id, &alert.topic)?.is_some() {
                return Ok(None);
            }
            alerts::insert_active_alert(&conn, &alert)?;
            Ok(Some(alert))
        })
        .await?
    }

    pub async fn update_alert_status(
        &self,
        id: impl Into<String>,
        status: AlertStatus,
        handled_by: Option<String>,
    ) -> StoreResult<ActiveAlert> {
        let conn = self.conn.clone();
        let id = id.into();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            alerts::update_alert_status(&conn, &id, status, handled_by.as_deref(), Utc::now())
        })
        .await?
    }

    pub async fn purge_resolved(&self) -> StoreResult<u64> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            alerts::purge_resolved(&conn)
        })
        .await?
    }

    pub async fn bounds(&self) -> StoreResult<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            maintenance::bounds(&conn)
        })
        .await?
    }

    /// Spawn the periodic maintenance worker (§4.6): checkpoint every
    /// `checkpoint_interval` (default ~15s), prune when the database exceeds
    /// `max_size_mb`, and broadcast the supplemented `db-status-update` /
    /// `pruning-status` / `db-bounds` envelopes (SPEC_FULL §3) after each
    /// pass.
    pub fn spawn_maintenance_loop(
        &self,
        bus: broadcast_bus::BroadcastBus,
        checkpoint_interval: Duration,
        max_size_mb: u64,
        prune_chunk_size: u64,
    ) {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(checkpoint_interval);
            loop {
                ticker.tick().await;
                store.run_maintenance_pass(&bus, max_size_mb, prune_chunk_size).await;
            }
        });
    }

    async fn run_maintenance_pass(
        &self,
        bus: &broadcast_bus::BroadcastBus,
        max_size_mb: u64,
        prune_chunk_size: u64,
    ) {
        let conn = self.conn.clone();
        let result = tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            maintenance::checkpoint(&conn)?;
            let deleted = maintenance::prune_if_needed(&conn, max_size_mb, prune_chunk_size)?;
            let bounds = maintenance::bounds(&conn)?;
            Ok::<_, StoreError>((deleted, bounds))
        })
        .await;

        match result {
            Ok(Ok((deleted, (oldest, newest)))) => {
                bus.publish(BroadcastEnvelope::DbStatusUpdate {
                    healthy: true,
                    detail: None,
                });
                if deleted > 0 {
                    info!(rows_deleted = deleted, "pruned oldest events over size budget");
                    bus.publish(BroadcastEnvelope::PruningStatus { rows_deleted: deleted });
                }
                bus.publish(BroadcastEnvelope::DbBounds { oldest, newest });
            }
            Ok(Err(e)) => {
                warn!(error = %e, "maintenance pass failed");
                bus.publish(BroadcastEnvelope::DbStatusUpdate {
                    healthy: false,
                    detail: Some(e.to_string()),
                });
            }
            Err(e) => {
                warn!(error = %e, "maintenance worker task panicked");
            }
        }
    }
}
