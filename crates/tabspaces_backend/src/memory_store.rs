use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tabspaces_domain::{KeyValueStore, StoreBatch};

/// In-process store for tests and throwaway sessions.
#[derive(Clone, Default)]
pub struct MemoryStore {
    values: Arc<Mutex<HashMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.lock().map(|values| values.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, String> {
        let values = self
            .values
            .lock()
            .map_err(|_| "memory store poisoned".to_owned())?;
        Ok(values.get(key).cloned())
    }

    fn write(&self, batch: StoreBatch) -> Result<(), String> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| "memory store poisoned".to_owned())?;
        for key in batch.remove {
            values.remove(&key);
        }
        for (key, value) in batch.set {
            values.insert(key, value);
        }
        Ok(())
    }
}
