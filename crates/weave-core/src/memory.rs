use std::collections::HashMap;
use std::sync::RwLock;

/// Process-wide note store shared across agents. Carries its own lock so
/// agents can read and write concurrently without touching server state.
#[derive(Debug, Default)]
pub struct SharedMemoryStore {
    notes: RwLock<HashMap<String, String>>,
}

impl SharedMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut notes = self.notes.write().unwrap_or_else(|e| e.into_inner());
        notes.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let notes = self.notes.read().unwrap_or_else(|e| e.into_inner());
        notes.get(key).cloned()
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        let mut notes = self.notes.write().unwrap_or_else(|e| e.into_inner());
        notes.remove(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let notes = self.notes.read().unwrap_or_else(|e| e.into_inner());
        notes.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        let notes = self.notes.read().unwrap_or_else(|e| e.into_inner());
        notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
