// SPDX-License-Identifier: Apache-2.0

//! Per-`(source_topic, target.id)` metrics (§3): a monotonic success
//! counter plus a bounded ring of the last `N = 20` log entries. Success
//! broadcasts coalesce with a debounce; error broadcasts never do (§4.4).

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use uns_model::TransformMetricsEntry;

const RING_CAPACITY: usize = 20;
const COALESCE_DEBOUNCE: Duration = Duration::from_millis(1500);

#[derive(Default)]
struct MetricRecord {
    success_count: u64,
    entries: VecDeque<TransformMetricsEntry>,
    last_broadcast_success: Option<Instant>,
}

/// One snapshot row, keyed by `(source_topic, target_id)`.
#[derive(Clone, Debug)]
pub struct TransformMetricsSnapshot {
    pub source_topic: String,
    pub target_id: String,
    pub success_count: u64,
    pub entries: Vec<TransformMetricsEntry>,
}

/// Component D's metrics store. Process-global, owned by the engine; each
/// key has a short-lived lock taken only for the update itself (§5, §9
/// "Global mutable state").
#[derive(Default)]
pub struct TransformMetrics {
    records: DashMap<(String, String), MetricRecord>,
}

/// Whether a broadcast should fire immediately (errors, §4.4: "no
/// coalescing") and whether it should fire at all (success/debug entries
/// debounce).
pub enum BroadcastDecision {
    Immediate,
    Coalesced,
    Suppressed,
}

impl TransformMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(
        &self,
        source_topic: &str,
        target_id: &str,
        out_topic: String,
        out_payload_snippet: String,
    ) -> (BroadcastDecision, u64) {
        self.record(
            source_topic,
            target_id,
            TransformMetricsEntry {
                ts: Utc::now(),
                in_topic: source_topic.to_string(),
                out_topic: Some(out_topic),
                out_payload_snippet: Some(out_payload_snippet),
                error: None,
                debug: None,
            },
            true,
        )
    }

    pub fn record_error(&self, source_topic: &str, target_id: &str, error: String) -> u64 {
        self.record(
            source_topic,
            target_id,
            TransformMetricsEntry {
                ts: Utc::now(),
                in_topic: source_topic.to_string(),
                out_topic: None,
                out_payload_snippet: None,
                error: Some(error),
                debug: None,
            },
            false,
        )
        .1
    }

    pub fn record_debug(
        &self,
        source_topic: &str,
        target_id: &str,
        debug: String,
    ) -> (BroadcastDecision, u64) {
        self.record(
            source_topic,
            target_id,
            TransformMetricsEntry {
                ts: Utc::now(),
                in_topic: source_topic.to_string(),
                out_topic: None,
                out_payload_snippet: None,
                error: None,
                debug: Some(debug),
            },
            true,
        )
    }

    fn record(
        &self,
        source_topic: &str,
        target_id: &str,
        entry: TransformMetricsEntry,
        debounced: bool,
    ) -> (BroadcastDecision, u64) {
        let key = (source_topic.to_string(), target_id.to_string());
        let mut record = self.records.entry(key).or_default();

        if entry.is_success() {
            record.success_count += 1;
        }
        if record.entries.len() >= RING_CAPACITY {
            record.entries.pop_front();
        }
        record.entries.push_back(entry);
        let success_count = record.success_count;

        if !debounced {
            return (BroadcastDecision::Immediate, success_count);
        }

        let now = Instant::now();
        let decision = match record.last_broadcast_success {
            Some(last) if now.duration_since(last) < COALESCE_DEBOUNCE => BroadcastDecision::Suppressed,
            _ => {
                record.last_broadcast_success = Some(now);
                BroadcastDecision::Coalesced
            }
        };
        (decision, success_count)
    }

    /// Read accessor for the out-of-core HTTP layer (SPEC_FULL §3).
    pub fn snapshot(&self) -> Vec<TransformMetricsSnapshot> {
        self.records
            .iter()
            .map(|entry| {
                let ((source_topic, target_id), record) = (entry.key().clone(), entry.value());
                TransformMetricsSnapshot {
                    source_topic,
                    target_id,
                    success_count: record.success_count,
                    entries: record.entries.iter().cloned().collect(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_increments_count_error_does_not() {
        let metrics = TransformMetrics::new();
        metrics.record_success("a/b", "t1", "a/c".into(), "{}".into());
        metrics.record_error("a/b", "t1", "boom".into());

        let snap = metrics.snapshot();
        let row = snap.iter().find(|r| r.target_id == "t1").unwrap();
        assert_eq!(row.success_count, 1);
        assert_eq!(row.entries.len(), 2);
    }

    #[test]
    fn ring_caps_at_twenty_entries() {
        let metrics = TransformMetrics::new();
        for i in 0..30 {
            metrics.record_success("a/b", "t1", format!("out/{i}"), "{}".into());
        }
        let snap = metrics.snapshot();
        let row = snap.iter().find(|r| r.target_id == "t1").unwrap();
        assert_eq!(row.entries.len(), 20);
        assert_eq!(row.success_count, 30);
    }

    #[test]
    fn error_broadcast_is_always_immediate() {
        let metrics = TransformMetrics::new();
        metrics.record_success("a/b", "t1", "a/c".into(), "{}".into());
        let (decision, success_count) = metrics.record(
            "a/b",
            "t1",
            TransformMetricsEntry {
                ts: Utc::now(),
                in_topic: "a/b".into(),
                out_topic: None,
                out_payload_snippet: None,
                error: Some("boom".into()),
                debug: None,
            },
            false,
        );
        assert!(matches!(decision, BroadcastDecision::Immediate));
        assert_eq!(success_count, 1);
    }

    #[test]
    fn rapid_successes_coalesce() {
        let metrics = TransformMetrics::new();
        let (first, _) = metrics.record_success("a/b", "t1", "x".into(), "{}".into());
        let (second, _) = metrics.record_success("a/b", "t1", "x".into(), "{}".into());
        assert!(matches!(first, BroadcastDecision::Coalesced));
        assert!(matches!(second, BroadcastDecision::Suppressed));
    }
}
