//! Bounded hand-off queue between the capture and dispatch workers
//!
//! Captured packets can arrive far faster than a handler consumes them, so
//! the queue holds at most `capacity` items and drops new ones once full.
//! Items and the accepting flag share one mutex, and one condition variable
//! signals both new items and closing, so a consumer can never miss the
//! wakeup that tells it to exit.

use std::collections::VecDeque;
use std::mem;

use parking_lot::{Condvar, Mutex};

use crate::config::normalize_capacity;

/// Outcome of [`BoundedPacketQueue::push`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Push {
    /// Item appended, one waiter woken
    Queued,
    /// Queue full, item discarded
    Dropped,
    /// Queue closed, item discarded
    Closed,
}

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    accepting: bool,
}

/// Fixed-capacity FIFO with drop-when-full policy
#[derive(Debug)]
pub struct BoundedPacketQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
    capacity: usize,
}

impl<T> BoundedPacketQueue<T> {
    /// Create an accepting queue; a capacity of 0 selects the default
    pub fn new(capacity: usize) -> Self {
        let capacity = normalize_capacity(capacity);
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                accepting: true,
            }),
            available: Condvar::new(),
            capacity,
        }
    }

    /// Append an item unless the queue is full or closed
    pub fn push(&self, item: T) -> Push {
        let mut state = self.state.lock();
        if !state.accepting {
            return Push::Closed;
        }
        if state.items.len() >= self.capacity {
            return Push::Dropped;
        }
        state.items.push_back(item);
        drop(state);

        self.available.notify_one();
        Push::Queued
    }

    /// Block until items are available and take all of them.
    ///
    /// Returns `None` once the queue is closed and empty. Items queued before
    /// [`close`](Self::close) are still returned.
    pub fn wait_drain(&self) -> Option<VecDeque<T>> {
        let mut state = self.state.lock();
        loop {
            if !state.items.is_empty() {
                return Some(mem::take(&mut state.items));
            }
            if !state.accepting {
                return None;
            }
            // Wakeups may be spurious, the loop re-checks.
            self.available.wait(&mut state);
        }
    }

    /// Take all items without blocking
    pub fn try_drain(&self) -> VecDeque<T> {
        mem::take(&mut self.state.lock().items)
    }

    /// Stop accepting items and wake every waiter
    pub fn close(&self) {
        self.state.lock().accepting = false;
        self.available.notify_all();
    }

    /// Accept items again after [`close`](Self::close)
    pub fn reopen(&self) {
        self.state.lock().accepting = true;
    }

    /// Discard all queued items, returning how many were removed
    pub fn clear(&self) -> usize {
        let leftovers = self.try_drain();
        leftovers.len()
    }

    /// Number of queued items (advisory snapshot)
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_accepting(&self) -> bool {
        self.state.lock().accepting
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_push_until_full() {
        let queue = BoundedPacketQueue::new(3);
        assert_eq!(queue.push(1), Push::Queued);
        assert_eq!(queue.push(2), Push::Queued);
        assert_eq!(queue.push(3), Push::Queued);
        assert_eq!(queue.push(4), Push::Dropped);
        assert_eq!(queue.push(5), Push::Dropped);

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.try_drain(), VecDeque::from(vec![1, 2, 3]));
    }

    #[test]
    fn test_zero_capacity_uses_default() {
        let queue: BoundedPacketQueue<u8> = BoundedPacketQueue::new(0);
        assert_eq!(queue.capacity(), 100);
    }

    #[test]
    fn test_closed_queue_refuses_items() {
        let queue = BoundedPacketQueue::new(2);
        queue.close();
        assert!(!queue.is_accepting());
        assert_eq!(queue.push(1), Push::Closed);
        assert!(queue.is_empty());

        queue.reopen();
        assert_eq!(queue.push(1), Push::Queued);
    }

    #[test]
    fn test_wait_drain_returns_backlog_after_close() {
        let queue = BoundedPacketQueue::new(4);
        queue.push("a");
        queue.push("b");
        queue.close();

        assert_eq!(queue.wait_drain(), Some(VecDeque::from(vec!["a", "b"])));
        assert_eq!(queue.wait_drain(), None);
    }

    #[test]
    fn test_close_wakes_waiter() {
        let queue: Arc<BoundedPacketQueue<u32>> = Arc::new(BoundedPacketQueue::new(4));
        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.wait_drain())
        };

        thread::sleep(Duration::from_millis(50));
        queue.close();

        assert_eq!(waiter.join().unwrap(), None);
    }

    #[test]
    fn test_consumer_sees_fifo_order() {
        let queue = Arc::new(BoundedPacketQueue::new(1000));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut seen = Vec::new();
                while let Some(batch) = queue.wait_drain() {
                    seen.extend(batch);
                }
                seen
            })
        };

        for i in 0..500u32 {
            assert_eq!(queue.push(i), Push::Queued);
        }
        queue.close();

        let seen = consumer.join().unwrap();
        assert_eq!(seen, (0..500).collect::<Vec<_>>());
    }

    #[test]
    fn test_len_never_exceeds_capacity_under_contention() {
        let queue = Arc::new(BoundedPacketQueue::new(8));
        let producers: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    let mut dropped = 0;
                    for i in 0..1000u32 {
                        if queue.push(i) == Push::Dropped {
                            dropped += 1;
                        }
                        assert!(queue.len() <= queue.capacity());
                    }
                    dropped
                })
            })
            .collect();

        let dropped: u32 = producers.into_iter().map(|p| p.join().unwrap()).sum();

        assert_eq!(queue.len(), 8);
        assert_eq!(dropped, 4000 - 8);
        assert_eq!(queue.clear(), 8);
        assert!(queue.is_empty());
    }
}
