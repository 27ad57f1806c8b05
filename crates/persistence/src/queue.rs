// SPDX-License-Identifier: Apache-2.0

//! The in-memory queue in front of the store: `insert` never blocks, and
//! overflow drops the oldest entry rather than applying back-pressure to
//! the message handler (§4.3).

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Notify;
use uns_model::Event;

/// Soft bound on queued, unbatched events. Chosen to absorb a multi-minute
/// store outage at a sustained few thousand events/sec without unbounded
/// memory growth; the spec leaves the exact figure implementation-chosen
/// (§4.3).
pub const DEFAULT_SOFT_BOUND: usize = 250_000;

#[derive(Clone, Copy, Debug, Default)]
pub struct QueueStats {
    pub pending: usize,
    pub processed: u64,
    pub dropped: u64,
}

pub struct BoundedQueue {
    events: Mutex<VecDeque<Event>>,
    notify: Notify,
    soft_bound: usize,
    batch_size: usize,
    processed: AtomicU64,
    dropped: AtomicU64,
}

impl BoundedQueue {
    pub fn new(soft_bound: usize, batch_size: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            soft_bound,
            batch_size,
            processed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Non-blocking push. Drops the oldest queued event when the soft
    /// bound is exceeded and wakes the worker once the queue has crossed
    /// `batch_size`, so a burst doesn't wait for the next timer tick
    /// (§4.3's "whenever the queue exceeds BATCH_SIZE").
    pub fn push(&self, event: Event) {
        let mut events = self.events.lock().unwrap();
        events.push_back(event);
        if events.len() > self.soft_bound {
            events.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        let should_wake = events.len() >= self.batch_size;
        drop(events);
        if should_wake {
            self.notify.notify_one();
        }
    }

    /// Pop up to `batch_size` events, oldest first.
    pub fn drain_batch(&self) -> Vec<Event> {
        let mut events = self.events.lock().unwrap();
        let take = self.batch_size.min(events.len());
        events.drain(..take).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().unwrap().is_empty()
    }

    pub async fn wait_for_work(&self, interval: std::time::Duration) {
        tokio::select! {
            _ = self.notify.notified() => {}
            _ = tokio::time::sleep(interval) => {}
        }
    }

    pub fn record_processed(&self, count: usize) {
        self.processed.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.events.lock().unwrap().len(),
            processed: self.processed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_event(topic: &str) -> Event {
        Event::new("b1", topic, Utc::now(), "{}", false)
    }

    #[test]
    fn push_past_soft_bound_drops_oldest() {
        let queue = BoundedQueue::new(2, 10);
        queue.push(sample_event("a"));
        queue.push(sample_event("b"));
        queue.push(sample_event("c"));

        let drained = queue.drain_batch();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].topic, "b");
        assert_eq!(drained[1].topic, "c");
        assert_eq!(queue.stats().dropped, 1);
    }

    #[test]
    fn drain_batch_caps_at_batch_size() {
        let queue = BoundedQueue::new(100, 2);
        for i in 0..5 {
            queue.push(sample_event(&format!("t{i}")));
        }
        let first = queue.drain_batch();
        assert_eq!(first.len(), 2);
        assert_eq!(queue.stats().pending, 3);
    }
}
