// SPDX-License-Identifier: Apache-2.0

//! Periodic maintenance (§4.6): a checkpoint every ~15s plus bounded
//! retention. Both are driven by `Store::spawn_maintenance_loop` and their
//! results are broadcast as `db-status-update` / `pruning-status` /
//! `db-bounds` (§3's supplemented envelope assignments).

use chrono::{DateTime, Utc};
use duckdb::Connection;

use crate::errors::StoreResult;

pub fn checkpoint(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch("CHECKPOINT;")?;
    Ok(())
}

pub fn database_size_mb(conn: &Connection) -> StoreResult<f64> {
    let (used_blocks, block_size): (i64, i64) = conn.query_row(
        "SELECT used_blocks, block_size FROM pragma_database_size()",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok((used_blocks * block_size) as f64 / (1024.0 * 1024.0))
}

/// Delete the oldest `prune_chunk_size` rows once the database exceeds
/// `max_size_mb`. Returns the number of rows deleted (0 when under budget).
pub fn prune_if_needed(
    conn: &Connection,
    max_size_mb: u64,
    prune_chunk_size: u64,
) -> StoreResult<u64> {
    let size_mb = database_size_mb(conn)?;
    if size_mb <= max_size_mb as f64 {
        return Ok(0);
    }

    let deleted = conn.execute(
        "DELETE FROM mqtt_events WHERE (timestamp, topic, broker_id) IN (
            SELECT timestamp, topic, broker_id FROM mqtt_events
            ORDER BY timestamp ASC LIMIT ?
        )",
        duckdb::params![prune_chunk_size],
    )?;
    Ok(deleted as u64)
}

pub fn bounds(conn: &Connection) -> StoreResult<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
    conn.query_row(
        "SELECT min(timestamp), max(timestamp) FROM mqtt_events",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .map_err(Into::into)
}
