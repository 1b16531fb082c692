//! Bounded concurrent queue
//!
//! A deque behind one mutex with two condition variables. Producers insert at
//! the front and consumers take from the back, so the queue is FIFO.
//!
//! ```text
//!   push ──► [ newest, ..., oldest ] ──► pop
//!                 force_push evicts ──────┘ when full
//! ```
//!
//! A capacity of 0 means unbounded.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

pub struct SharedQueue<T> {
    items: Mutex<VecDeque<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> SharedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Queue without a capacity limit
    pub fn unbounded() -> Self {
        Self::new(0)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn is_full(&self, items: &VecDeque<T>) -> bool {
        self.capacity != 0 && items.len() >= self.capacity
    }

    /// Insert, blocking while the queue is full
    pub fn push(&self, item: T) {
        let mut items = self.items.lock();
        while self.is_full(&items) {
            self.not_full.wait(&mut items);
        }
        items.push_front(item);
        self.not_empty.notify_one();
    }

    /// Insert unless full. Returns false if the item was rejected.
    pub fn try_push(&self, item: T) -> bool {
        let mut items = self.items.lock();
        if self.is_full(&items) {
            return false;
        }
        items.push_front(item);
        self.not_empty.notify_one();
        true
    }

    /// Insert, evicting the oldest element when full.
    ///
    /// Returns false if an element was evicted.
    pub fn force_push(&self, item: T) -> bool {
        let mut items = self.items.lock();
        let mut kept_all = true;
        while self.is_full(&items) {
            items.pop_back();
            kept_all = false;
        }
        items.push_front(item);
        self.not_empty.notify_one();
        kept_all
    }

    /// Remove the oldest element, blocking while empty
    pub fn pop(&self) -> T {
        let mut items = self.items.lock();
        loop {
            if let Some(item) = items.pop_back() {
                self.not_full.notify_one();
                return item;
            }
            self.not_empty.wait(&mut items);
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        let mut items = self.items.lock();
        let item = items.pop_back();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Remove the oldest element, waiting at most `timeout`
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut items = self.items.lock();
        loop {
            if let Some(item) = items.pop_back() {
                self.not_full.notify_one();
                return Some(item);
            }
            if self.not_empty.wait_until(&mut items, deadline).timed_out() {
                let item = items.pop_back();
                if item.is_some() {
                    self.not_full.notify_one();
                }
                return item;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn clear(&self) {
        self.items.lock().clear();
        self.not_full.notify_all();
    }

    /// Run `f` with exclusive access to the underlying deque.
    ///
    /// `f` must not call back into this queue.
    pub fn critical_section<R>(&self, f: impl FnOnce(&mut VecDeque<T>) -> R) -> R {
        let mut items = self.items.lock();
        let result = f(&mut items);
        if !self.is_full(&items) {
            self.not_full.notify_all();
        }
        if !items.is_empty() {
            self.not_empty.notify_all();
        }
        result
    }
}

impl<T: Clone> SharedQueue<T> {
    /// Oldest element without removing it
    pub fn peek(&self) -> Option<T> {
        self.items.lock().back().cloned()
    }

    /// Visit every element, newest first. Returns the number visited.
    pub fn for_each(&self, mut f: impl FnMut(&T)) -> usize {
        let items = self.items.lock();
        for item in items.iter() {
            f(item);
        }
        items.len()
    }

    /// First element, newest first, matching `pred`
    pub fn find_if(&self, mut pred: impl FnMut(&T) -> bool) -> Option<T> {
        self.items.lock().iter().find(|item| pred(item)).cloned()
    }

    /// Copy of every element, newest first
    pub fn snapshot(&self) -> Vec<T> {
        self.items.lock().iter().cloned().collect()
    }
}

impl<T> Default for SharedQueue<T> {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let q = SharedQueue::new(0);
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.peek(), Some(1));
        assert_eq!(q.pop(), 1);
        assert_eq!(q.try_pop(), Some(2));
        assert_eq!(q.pop_timeout(Duration::from_millis(1)), Some(3));
        assert_eq!(q.try_pop(), None);
    }

    #[test]
    fn test_try_push_respects_capacity() {
        let q = SharedQueue::new(2);
        assert!(q.try_push(1));
        assert!(q.try_push(2));
        assert!(!q.try_push(3));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn test_force_push_evicts_oldest() {
        let q = SharedQueue::new(2);
        assert!(q.force_push(1));
        assert!(q.force_push(2));
        assert!(!q.force_push(3));
        assert_eq!(q.len(), 2);
        assert_eq!(q.try_pop(), Some(2));
        assert_eq!(q.try_pop(), Some(3));
    }

    #[test]
    fn test_single_slot_keeps_latest() {
        let q = SharedQueue::new(1);
        for i in 0..10 {
            q.force_push(i);
        }
        assert_eq!(q.len(), 1);
        assert_eq!(q.peek(), Some(9));
    }

    #[test]
    fn test_pop_timeout_empty() {
        let q: SharedQueue<u8> = SharedQueue::new(4);
        let start = Instant::now();
        assert_eq!(q.pop_timeout(Duration::from_millis(20)), None);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_push_blocks_until_pop() {
        let q = Arc::new(SharedQueue::new(1));
        q.push(1);

        let producer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.push(2))
        };

        thread::sleep(Duration::from_millis(20));
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop(), 1);
        producer.join().unwrap();
        assert_eq!(q.pop(), 2);
    }

    #[test]
    fn test_pop_wakes_on_push() {
        let q = Arc::new(SharedQueue::new(0));
        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.pop_timeout(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(10));
        q.push(42);
        assert_eq!(consumer.join().unwrap(), Some(42));
    }

    #[test]
    fn test_iteration_helpers() {
        let q = SharedQueue::new(0);
        q.push("a");
        q.push("b");
        let mut seen = Vec::new();
        assert_eq!(q.for_each(|s| seen.push(*s)), 2);
        assert_eq!(seen, vec!["b", "a"]);
        assert_eq!(q.find_if(|s| *s == "a"), Some("a"));
        assert_eq!(q.find_if(|s| *s == "z"), None);
        assert_eq!(q.snapshot(), vec!["b", "a"]);
    }

    #[test]
    fn test_critical_section_removes() {
        let q = SharedQueue::new(3);
        q.push(1);
        q.push(2);
        q.push(3);
        let removed = q.critical_section(|items| {
            let before = items.len();
            items.retain(|v| *v != 2);
            before - items.len()
        });
        assert_eq!(removed, 1);
        assert!(q.try_push(4));
        q.clear();
        assert!(q.is_empty());
    }
}
