//! Bounded trigger queue
//!
//! Per-application event mailbox between the watcher/drift tasks and the
//! reconcile worker. Bounded with drop-oldest overflow: under a trigger
//! storm the newest work survives, and since triggers are coalesced on
//! drain a dropped older trigger is subsumed by the ones that remain.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;

/// Bounded multi-producer, single-consumer trigger queue
pub struct EventQueue<T> {
    capacity: usize,
    items: Mutex<VecDeque<T>>,
    notify: Notify,
    dropped: AtomicU64,
}

impl<T> EventQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueues a trigger, evicting the oldest one when full
    pub fn push(&self, item: T) {
        {
            let mut items = self.items.lock().unwrap();
            if items.len() == self.capacity {
                items.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            items.push_back(item);
        }
        self.notify.notify_one();
    }

    /// Takes every queued trigger at once for coalescing
    pub fn drain(&self) -> Vec<T> {
        let mut items = self.items.lock().unwrap();
        items.drain(..).collect()
    }

    /// Waits until at least one trigger is queued
    pub async fn wait(&self) {
        loop {
            if !self.items.lock().unwrap().is_empty() {
                return;
            }
            self.notify.notified().await;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().unwrap().is_empty()
    }

    /// Triggers evicted by overflow since creation
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_overflow_drops_oldest_first() {
        let queue = EventQueue::new(3);
        for i in 0..5 {
            queue.push(i);
        }

        assert_eq!(queue.drain(), vec![2, 3, 4]);
        assert_eq!(queue.dropped(), 2);
    }

    #[test]
    fn test_drain_empties_the_queue() {
        let queue = EventQueue::new(8);
        queue.push("a");
        queue.push("b");

        assert_eq!(queue.drain(), vec!["a", "b"]);
        assert!(queue.is_empty());
        assert!(queue.drain().is_empty());
    }

    #[tokio::test]
    async fn test_wait_wakes_on_push() {
        let queue = Arc::new(EventQueue::new(4));

        let pusher = Arc::clone(&queue);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            pusher.push(42);
        });

        tokio::time::timeout(Duration::from_secs(1), queue.wait())
            .await
            .expect("wait should wake once an item arrives");
        assert_eq!(queue.drain(), vec![42]);
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_when_nonempty() {
        let queue = EventQueue::new(4);
        queue.push(1);

        tokio::time::timeout(Duration::from_millis(50), queue.wait())
            .await
            .expect("wait must not block when items are queued");
    }
}
