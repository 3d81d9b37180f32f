//! Recent access events for observers.
//!
//! Keeps the last N recorded events in memory and broadcasts every new one.
//! Slow subscribers lag and miss events rather than holding up the logger.

use std::collections::VecDeque;
use std::sync::Arc;

use latchkey_core::AccessEvent;
use parking_lot::Mutex;
use tokio::sync::broadcast;

/// Broadcast buffer per subscriber.
const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct EventFeed {
    inner: Arc<FeedInner>,
}

#[derive(Debug)]
struct FeedInner {
    recent: Mutex<VecDeque<AccessEvent>>,
    capacity: usize,
    tx: broadcast::Sender<AccessEvent>,
}

impl EventFeed {
    /// Feed that remembers the last `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(FeedInner {
                recent: Mutex::new(VecDeque::with_capacity(capacity)),
                capacity: capacity.max(1),
                tx,
            }),
        }
    }

    pub fn publish(&self, event: AccessEvent) {
        {
            let mut recent = self.inner.recent.lock();
            if recent.len() == self.inner.capacity {
                recent.pop_front();
            }
            recent.push_back(event.clone());
        }
        // No subscribers is fine.
        let _ = self.inner.tx.send(event);
    }

    /// Up to `limit` most recent events, newest first.
    pub fn recent(&self, limit: usize) -> Vec<AccessEvent> {
        self.inner
            .recent
            .lock()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AccessEvent> {
        self.inner.tx.subscribe()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}
