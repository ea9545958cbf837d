//! Fixed-capacity FIFO buffer with overwrite-on-full.
//!
//! The bounding primitive for every metrics and alert feed: once full, each
//! push evicts the oldest entry, so instrumentation memory stays constant
//! for the lifetime of the session.

use std::collections::VecDeque;

/// Bounded FIFO buffer; pushing to a full buffer drops the oldest entry
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    buf: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create a buffer with the given capacity (clamped to at least 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an item, evicting the oldest when full.
    ///
    /// Returns the evicted item, if any.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.buf.len() == self.capacity {
            self.buf.pop_front()
        } else {
            None
        };
        self.buf.push_back(item);
        evicted
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest entry still retained
    pub fn front(&self) -> Option<&T> {
        self.buf.front()
    }

    /// Newest entry
    pub fn back(&self) -> Option<&T> {
        self.buf.back()
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buf.iter()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Snapshot the contents, oldest to newest
    pub fn to_vec(&self) -> Vec<T> {
        self.buf.iter().cloned().collect()
    }
}
