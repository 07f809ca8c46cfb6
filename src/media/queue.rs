//! Frame Delivery Queue
//!
//! Capture threads push, the session driver pops. The queue holds at most
//! `capacity` items and drops the oldest one when full, so the decoder always
//! looks at the freshest picture instead of working through a backlog.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;

use super::FrameBuffer;

/// Frames buffered between capture and decode
pub const FRAME_QUEUE_DEPTH: usize = 2;

/// Bounded drop-oldest buffer
pub struct LeakyQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    notify: Notify,
    dropped: AtomicU64,
}

impl<T> LeakyQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Push an item, returning the stale item evicted to make room (if any)
    pub fn push(&self, item: T) -> Option<T> {
        let evicted = {
            let mut items = self.items.lock();
            let evicted = if items.len() >= self.capacity {
                items.pop_front()
            } else {
                None
            };
            items.push_back(item);
            evicted
        };

        if evicted.is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        evicted
    }

    /// Take the oldest buffered item without waiting
    pub fn try_pop(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Wait for the next item
    pub async fn pop(&self) -> T {
        loop {
            if let Some(item) = self.try_pop() {
                return item;
            }
            // notify_one stores a permit when nobody waits, so a push between
            // try_pop and here is not lost
            self.notify.notified().await;
        }
    }

    /// Discard everything buffered (stale frames across a reconfiguration)
    pub fn clear(&self) {
        self.items.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items evicted since creation, for stats
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Camera frame queue
pub type FrameQueue = LeakyQueue<FrameBuffer>;

impl Default for LeakyQueue<FrameBuffer> {
    fn default() -> Self {
        Self::new(FRAME_QUEUE_DEPTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_drops_oldest_when_full() {
        let queue = LeakyQueue::new(2);
        assert_eq!(queue.push(1), None);
        assert_eq!(queue.push(2), None);
        assert_eq!(queue.push(3), Some(1));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped_count(), 1);
        assert_eq!(queue.try_pop(), Some(2));
        assert_eq!(queue.try_pop(), Some(3));
        assert_eq!(queue.try_pop(), None);
    }

    #[test]
    fn test_clear() {
        let queue = LeakyQueue::new(2);
        queue.push("a");
        queue.push("b");
        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let queue = LeakyQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        queue.push(1);
        assert_eq!(queue.push(2), Some(1));
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let queue = Arc::new(LeakyQueue::new(2));
        let producer = queue.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            producer.push(42);
        });

        assert_eq!(queue.pop().await, 42);
        handle.await.unwrap();
    }
}
