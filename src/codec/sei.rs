//! SEI side channel
//!
//! Payloads pushed by clients wait in a per-key FIFO until the next encoded
//! H.264 packet of the sink that carries the key picks one up. Keys have the
//! form `streamId.requestId`.

use std::collections::{HashMap, VecDeque};

use bytes::Bytes;
use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct SeiQueues {
    queues: Mutex<HashMap<String, VecDeque<Bytes>>>,
}

impl SeiQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh key for `stream_id`
    pub fn make_key(stream_id: &str) -> String {
        let id = uuid::Uuid::new_v4().simple().to_string();
        format!("{}.{}", stream_id, &id[..16])
    }

    /// Create an empty queue under `key`, dropping any previous one
    pub fn create(&self, key: &str) {
        let mut queues = self.queues.lock();
        if queues.remove(key).is_some() {
            tracing::debug!(key = %key, "Replaced SEI queue");
        }
        queues.insert(key.to_string(), VecDeque::new());
    }

    pub fn remove(&self, key: &str) -> bool {
        self.queues.lock().remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.queues.lock().contains_key(key)
    }

    /// Append a payload. Returns false if no queue exists under `key`.
    pub fn push(&self, key: &str, payload: impl Into<Bytes>) -> bool {
        match self.queues.lock().get_mut(key) {
            Some(queue) => {
                queue.push_back(payload.into());
                true
            }
            None => false,
        }
    }

    /// Oldest pending payload
    pub fn pop(&self, key: &str) -> Option<Bytes> {
        self.queues.lock().get_mut(key)?.pop_front()
    }

    /// Pending payloads under `key`
    pub fn len(&self, key: &str) -> usize {
        self.queues.lock().get(key).map_or(0, |q| q.len())
    }

    pub fn queue_count(&self) -> usize {
        self.queues.lock().len()
    }
}
