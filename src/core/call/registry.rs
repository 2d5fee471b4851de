use std::sync::Arc;

use dashmap::DashMap;

use super::Call;

/// Live calls indexed by dialog key.
#[derive(Debug, Default)]
pub struct CallRegistry {
    calls: DashMap<String, Arc<Call>>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `call`, returning the call previously stored under its key.
    pub fn insert(&self, call: Arc<Call>) -> Option<Arc<Call>> {
        self.calls.insert(call.key().to_string(), call)
    }

    pub fn get(&self, key: &str) -> Option<Arc<Call>> {
        self.calls.get(key).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, key: &str) -> Option<Arc<Call>> {
        self.calls.remove(key).map(|(_, call)| call)
    }

    /// Remove the entry for `call`'s key only if it still refers to `call`.
    pub fn remove_if_same(&self, call: &Arc<Call>) -> bool {
        self.calls
            .remove_if(call.key(), |_, current| Arc::ptr_eq(current, call))
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.calls.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Remove and return every call.
    pub fn drain_all(&self) -> Vec<Arc<Call>> {
        self.keys()
            .into_iter()
            .filter_map(|key| self.remove(&key))
            .collect()
    }
}
