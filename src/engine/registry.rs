//! Id-keyed registries
//!
//! Each registry owns its entries behind one lock. Lookups clone the handle
//! out and release the lock before the caller touches the entry, so no lock
//! is ever held across an operation on a connection, stream or muxer.

use std::collections::HashMap;

use parking_lot::Mutex;

pub struct Registry<T: Clone> {
    kind: &'static str,
    entries: Mutex<HashMap<String, T>>,
}

impl<T: Clone> Registry<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Insert `entry`, returning the one it replaced
    pub fn insert(&self, id: impl Into<String>, entry: T) -> Option<T> {
        let id = id.into();
        tracing::debug!(kind = self.kind, id = %id, "Registered");
        self.entries.lock().insert(id, entry)
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.entries.lock().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<T> {
        let removed = self.entries.lock().remove(id);
        if removed.is_some() {
            tracing::debug!(kind = self.kind, id = %id, "Unregistered");
        }
        removed
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    /// Remove every entry and hand them back
    pub fn drain(&self) -> Vec<T> {
        self.entries.lock().drain().map(|(_, v)| v).collect()
    }
}

impl<T: Clone> std::fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &self.kind)
            .field("len", &self.len())
            .finish()
    }
}
