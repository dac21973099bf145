//! Bounded per-topic event queue.
//!
//! The queue is the only structure shared between producer threads and
//! the topic's flush task. `offer` never blocks: when the configured
//! event or byte capacity would be exceeded the record is rejected and
//! the producer decides what to do. Records are stored already rendered,
//! so byte accounting uses exact payload sizes.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use skald_core::BufferingConfig;
use tokio::sync::Notify;

/// One rendered record awaiting flush.
#[derive(Debug, Clone)]
pub struct QueuedRecord {
    /// Event identifier, kept for diagnostics on terminal failures.
    pub id: String,
    /// Rendered record, without the trailing newline.
    pub line: String,
}

impl QueuedRecord {
    /// Payload cost including the record delimiter.
    pub fn cost(&self) -> usize {
        self.line.len() + 1
    }
}

struct Inner {
    records: VecDeque<QueuedRecord>,
    bytes: usize,
}

/// Bounded, thread-safe queue of pending serialized events.
pub struct EventQueue {
    inner: Mutex<Inner>,
    capacity_events: usize,
    capacity_bytes: usize,
    high_water_events: usize,
    high_water_bytes: usize,
    auto_flush: bool,
    wakeup: Notify,
}

impl EventQueue {
    pub fn new(config: &BufferingConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                records: VecDeque::with_capacity(config.max_size.min(4096)),
                bytes: 0,
            }),
            capacity_events: config.max_size,
            capacity_bytes: config.capacity_bytes(),
            high_water_events: config.max_batch_events,
            high_water_bytes: config.max_batch_bytes,
            auto_flush: config.auto_flush,
            wakeup: Notify::new(),
        }
    }

    /// Offer one record. Returns `false` when capacity would be exceeded.
    ///
    /// Crossing the batch high-water mark wakes the flush task through a
    /// coalesced notify token, so offer-pressure and the interval timer
    /// never double-schedule a flush.
    pub fn offer(&self, record: QueuedRecord) -> bool {
        let cost = record.cost();
        let at_high_water = {
            let mut inner = self.lock();
            if inner.records.len() + 1 > self.capacity_events
                || inner.bytes + cost > self.capacity_bytes
            {
                return false;
            }
            inner.bytes += cost;
            inner.records.push_back(record);
            inner.records.len() >= self.high_water_events || inner.bytes >= self.high_water_bytes
        };
        if at_high_water && self.auto_flush {
            self.wakeup.notify_one();
        }
        true
    }

    /// Pop at most one batch worth of records, leaving the remainder
    /// queued for the next trigger.
    pub fn drain(&self, max_events: usize, max_bytes: usize) -> Vec<QueuedRecord> {
        let mut inner = self.lock();
        let mut batch = Vec::new();
        let mut batch_bytes = 0usize;
        while batch.len() < max_events {
            let cost = match inner.records.front() {
                Some(record) => record.cost(),
                None => break,
            };
            if !batch.is_empty() && batch_bytes + cost > max_bytes {
                break;
            }
            if let Some(record) = inner.records.pop_front() {
                batch_bytes += cost;
                inner.bytes -= cost;
                batch.push(record);
            }
        }
        batch
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    /// Await the next coalesced high-water wake-up.
    pub async fn notified(&self) {
        self.wakeup.notified().await;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, len: usize) -> QueuedRecord {
        QueuedRecord {
            id: id.to_string(),
            line: "x".repeat(len),
        }
    }

    fn config(max_size: usize) -> BufferingConfig {
        BufferingConfig {
            max_size,
            ..Default::default()
        }
    }

    #[test]
    fn rejects_beyond_event_capacity() {
        let queue = EventQueue::new(&config(5));
        for i in 0..5 {
            assert!(queue.offer(record(&i.to_string(), 10)));
        }
        assert!(!queue.offer(record("overflow", 10)));
        assert_eq!(queue.len(), 5);
    }

    #[test]
    fn rejects_beyond_byte_capacity() {
        let mut cfg = config(100);
        cfg.average_per_event_payload_size = 10;
        // capacity_bytes = 1000
        let queue = EventQueue::new(&cfg);
        assert!(queue.offer(record("big", 900)));
        assert!(!queue.offer(record("too-big", 200)));
        assert!(queue.offer(record("fits", 50)));
    }

    #[test]
    fn drain_respects_caps_and_preserves_order() {
        let queue = EventQueue::new(&config(100));
        for i in 0..10 {
            assert!(queue.offer(record(&format!("{i:02}"), 10)));
        }
        let batch = queue.drain(4, usize::MAX);
        let ids: Vec<_> = batch.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["00", "01", "02", "03"]);
        assert_eq!(queue.len(), 6);

        // byte cap stops the batch early, but at least one record is taken
        let batch = queue.drain(10, 15);
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn high_water_mark_notifies_once() {
        let mut cfg = config(100);
        cfg.max_batch_events = 2;
        let queue = EventQueue::new(&cfg);
        assert!(queue.offer(record("a", 10)));
        assert!(queue.offer(record("b", 10)));
        assert!(queue.offer(record("c", 10)));

        // the token is coalesced: one await resolves, a second would block
        tokio::time::timeout(std::time::Duration::from_millis(50), queue.notified())
            .await
            .expect("high-water wakeup expected");
    }
}
