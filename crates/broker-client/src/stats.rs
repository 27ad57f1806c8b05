// SPDX-License-Identifier: Apache-2.0

// src/stats.rs
// Lightweight atomic counters for publish and queue throughput, surfaced
// to broker-supervisor for the `broker-status-all` snapshot (§4.7 / SPEC_FULL §3).

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublishStats {
    pub published: u64,
    pub published_bytes: u64,
    pub failed: u64,
}

#[derive(Default)]
pub struct PublishStatsTracker {
    published: AtomicU64,
    published_bytes: AtomicU64,
    failed: AtomicU64,
}

impl PublishStatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_published(&self, payload_size: usize) {
        self.published.fetch_add(1, Ordering::Relaxed);
        self.published_bytes
            .fetch_add(payload_size as u64, Ordering::Relaxed);
    }

    pub fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn to_stats(&self) -> PublishStats {
        PublishStats {
            published: self.published.load(Ordering::Relaxed),
            published_bytes: self.published_bytes.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    pub fn reset_counters(&self) {
        self.published.store(0, Ordering::Relaxed);
        self.published_bytes.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: u64,
    pub processed: u64,
    pub dropped: u64,
    pub event_loop_errors: u64,
}

#[derive(Default)]
pub struct QueueStatsTracker {
    pending: AtomicU64,
    processed: AtomicU64,
    dropped: AtomicU64,
    event_loop_errors: AtomicU64,
}

impl QueueStatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_pending(&self, _payload_size: usize) {
        self.pending.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement_pending_increment_processed(&self, _payload_size: usize) {
        self.pending.fetch_sub(1, Ordering::Relaxed);
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_dropped(&self, _payload_size: usize) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_event_loop_errors(&self) {
        self.event_loop_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.load(Ordering::Relaxed) == 0
    }

    pub fn to_stats(&self) -> QueueStats {
        QueueStats {
            pending: self.pending.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            event_loop_errors: self.event_loop_errors.load(Ordering::Relaxed),
        }
    }

    pub fn reset_counters(&self) {
        self.pending.store(0, Ordering::Relaxed);
        self.processed.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
        self.event_loop_errors.store(0, Ordering::Relaxed);
    }
}
