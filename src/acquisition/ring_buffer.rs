//! Fixed-capacity circular store of the most recent samples.
//!
//! Storage is allocated once at construction. A push when full silently
//! overwrites the oldest slot: ingestion never blocks and never fails.

use std::sync::{Arc, Mutex, MutexGuard};

/// Circular buffer holding the `capacity` most recently pushed items.
#[derive(Debug)]
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    /// Index the next push writes to.
    head: usize,
    len: usize,
    /// Pushes since construction (including evicting ones).
    total_pushed: u64,
}

impl<T: Clone> RingBuffer<T> {
    /// Create an empty buffer. A capacity of 0 is bumped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            head: 0,
            len: 0,
            total_pushed: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn total_pushed(&self) -> u64 {
        self.total_pushed
    }

    /// O(1). Evicts the oldest item when full.
    pub fn push(&mut self, item: T) {
        let capacity = self.slots.len();
        self.slots[self.head] = Some(item);
        self.head = (self.head + 1) % capacity;
        if self.len < capacity {
            self.len += 1;
        }
        self.total_pushed += 1;
    }

    /// The last `min(n, len)` items, oldest first. Does not mutate.
    pub fn snapshot(&self, n: usize) -> Vec<T> {
        let take = n.min(self.len);
        let capacity = self.slots.len();
        let start = (self.head + capacity - take) % capacity;
        (0..take)
            .filter_map(|i| self.slots[(start + i) % capacity].clone())
            .collect()
    }

    /// Drop every item. Capacity and the push counter are kept.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }
}

/// Ring buffer shared between the listener (single writer) and readers.
///
/// The lock is held only for the duration of a push or a copy; no I/O
/// ever happens under it.
#[derive(Debug)]
pub struct SharedRing<T> {
    inner: Arc<Mutex<RingBuffer<T>>>,
}

impl<T> Clone for SharedRing<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone> SharedRing<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RingBuffer::new(capacity))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RingBuffer<T>> {
        self.inner.lock().unwrap_or_else(|e| {
            tracing::warn!("Ring buffer mutex poisoned, recovering");
            e.into_inner()
        })
    }

    pub fn push(&self, item: T) {
        self.lock().push(item);
    }

    pub fn snapshot(&self, n: usize) -> Vec<T> {
        self.lock().snapshot(n)
    }

    /// Snapshot together with the push counter observed under the same lock.
    pub fn snapshot_with_count(&self, n: usize) -> (Vec<T>, u64) {
        let ring = self.lock();
        (ring.snapshot(n), ring.total_pushed())
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    pub fn total_pushed(&self) -> u64 {
        self.lock().total_pushed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_keeps_last_capacity_items_in_push_order() {
        let mut ring = RingBuffer::new(5);
        for i in 0..23 {
            ring.push(i);
            assert!(ring.len() <= 5);
        }
        assert_eq!(ring.snapshot(5), vec![18, 19, 20, 21, 22]);
        assert_eq!(ring.total_pushed(), 23);
    }

    #[test]
    fn snapshot_is_capped_at_len() {
        let mut ring = RingBuffer::new(10);
        ring.push("a");
        ring.push("b");
        assert_eq!(ring.snapshot(100), vec!["a", "b"]);
        assert_eq!(ring.snapshot(1), vec!["b"]);
        assert!(ring.snapshot(0).is_empty());
    }

    #[test]
    fn snapshot_does_not_mutate() {
        let mut ring = RingBuffer::new(4);
        for i in 0..6 {
            ring.push(i);
        }
        let first = ring.snapshot(4);
        for _ in 0..10 {
            assert_eq!(ring.snapshot(4), first);
        }
        assert_eq!(ring.len(), 4);
    }

    #[test]
    fn clear_resets_to_empty() {
        let mut ring = RingBuffer::new(3);
        ring.push(1);
        ring.push(2);
        ring.clear();
        assert!(ring.is_empty());
        assert!(ring.snapshot(3).is_empty());
        ring.push(9);
        assert_eq!(ring.snapshot(3), vec![9]);
    }

    #[test]
    fn zero_capacity_is_bumped() {
        let mut ring = RingBuffer::new(0);
        ring.push(1);
        ring.push(2);
        assert_eq!(ring.capacity(), 1);
        assert_eq!(ring.snapshot(5), vec![2]);
    }

    #[test]
    fn shared_ring_sees_pushes_from_clones() {
        let ring = SharedRing::new(3);
        let writer = ring.clone();
        let handle = std::thread::spawn(move || {
            for i in 0..100 {
                writer.push(i);
            }
        });
        handle.join().unwrap();
        assert_eq!(ring.snapshot(3), vec![97, 98, 99]);
        assert_eq!(ring.total_pushed(), 100);
    }
}
