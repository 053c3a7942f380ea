//! Bounded change-event queue with drop-oldest overflow.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::scan::FileChangeEvent;

/// Bounded queue between the watcher thread and the scheduler.
///
/// On overflow the oldest unread event is discarded so the queue always
/// holds the most recent `capacity` events; a push never blocks the watcher.
/// Discards are counted in [`EventQueue::dropped_count`].
pub struct EventQueue {
    inner: Mutex<VecDeque<FileChangeEvent>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl EventQueue {
    /// Create a queue holding at most `capacity` events (minimum one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Push an event, discarding the oldest entry if the queue is full.
    pub fn push(&self, event: FileChangeEvent) {
        let mut inner = self.inner.lock();
        if inner.len() == self.capacity {
            inner.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        inner.push_back(event);
    }

    /// Pop the oldest queued event.
    pub fn pop(&self) -> Option<FileChangeEvent> {
        self.inner.lock().pop_front()
    }

    /// Current number of queued events.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// True if no events are queued.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Maximum number of events held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total number of events discarded due to overflow.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
