//! In-process `LocalStore`.
//!
//! Cloning a `MemoryStore` shares the underlying map, so two contexts opened
//! on clones of the same store observe each other's writes. Tests use this to
//! simulate a process restart.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Result, StorageError};

use super::traits::LocalStore;

#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
    fail_writes: Arc<Mutex<Option<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with `message` (`None` to heal).
    pub fn set_write_failure(&self, message: Option<&str>) {
        *self.fail_writes.lock() = message.map(str::to_string);
    }

    /// Raw access to a stored value.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if let Some(message) = self.fail_writes.lock().clone() {
            return Err(StorageError::backend(message).into());
        }
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        if let Some(message) = self.fail_writes.lock().clone() {
            return Err(StorageError::backend(message).into());
        }
        let mut map = self.entries.lock();
        for (key, value) in entries {
            map.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }
}
