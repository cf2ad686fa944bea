//! Bounded in-memory notification log, polled by gateways.

use std::collections::VecDeque;

use auction_module::{Notification, Notifier};
use auction_rpc::NotificationRecord;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::info;

struct LogInner {
    records: VecDeque<NotificationRecord>,
    next_seq: u64,
}

/// Keeps the most recent `capacity` notifications, numbered from 1.
pub struct NotificationLog {
    inner: Mutex<LogInner>,
    capacity: usize,
}

impl NotificationLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LogInner {
                records: VecDeque::with_capacity(capacity),
                next_seq: 1,
            }),
            capacity: capacity.max(1),
        }
    }

    /// Records with a sequence number greater than `seq`, oldest first.
    pub fn since(&self, seq: u64) -> Vec<NotificationRecord> {
        let inner = self.inner.lock();
        inner
            .records
            .iter()
            .filter(|r| r.seq > seq)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }
}

impl Notifier for NotificationLog {
    fn notify(&self, notification: Notification) {
        info!(kind = notification.kind(), "Notification");
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        if inner.records.len() == self.capacity {
            inner.records.pop_front();
        }
        inner.records.push_back(NotificationRecord {
            seq,
            at: Utc::now(),
            notification,
        });
    }
}
