//! Cancellable deferred events.
//!
//! Each timer is a spawned sleep that posts an event back to the scheduler. At
//! most one timer exists per key; scheduling a key again aborts the previous one.

use std::collections::HashMap;
use std::hash::Hash;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::AbortHandle;
use tokio::time::{sleep_until, Instant};

#[derive(Debug)]
pub struct TimerSet<K> {
    handles: HashMap<K, AbortHandle>,
}

impl<K> Default for TimerSet<K> {
    fn default() -> Self {
        Self {
            handles: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Copy> TimerSet<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post `event` to `tx` at `deadline`, replacing any timer under `key`.
    pub fn schedule<E: Send + 'static>(
        &mut self,
        key: K,
        deadline: Instant,
        tx: &UnboundedSender<E>,
        event: E,
    ) {
        let tx = tx.clone();
        let handle = tokio::spawn(async move {
            sleep_until(deadline).await;
            let _ = tx.send(event);
        })
        .abort_handle();

        if let Some(previous) = self.handles.insert(key, handle) {
            previous.abort();
        }
    }

    /// Abort the timer under `key`. Also used to forget a timer that fired.
    pub fn cancel(&mut self, key: K) {
        if let Some(handle) = self.handles.remove(&key) {
            handle.abort();
        }
    }

    /// Abort every timer whose key matches.
    pub fn cancel_where(&mut self, mut pred: impl FnMut(&K) -> bool) {
        self.handles.retain(|key, handle| {
            if pred(key) {
                handle.abort();
                false
            } else {
                true
            }
        });
    }

    pub fn cancel_all(&mut self) {
        for (_, handle) in self.handles.drain() {
            handle.abort();
        }
    }

    pub fn contains(&self, key: K) -> bool {
        self.handles.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl<K> Drop for TimerSet<K> {
    fn drop(&mut self) {
        for (_, handle) in self.handles.drain() {
            handle.abort();
        }
    }
}
