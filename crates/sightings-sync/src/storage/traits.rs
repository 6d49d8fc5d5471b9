//! Local durable store trait.

use crate::error::Result;

/// Durable key-value storage backing the local cache and the pending log.
///
/// Values survive process restarts. Implementors must be `Send + Sync` so a
/// single store can be shared between the mutation path and the sync engine.
/// Calls are synchronous: a read-modify-write on the replica never yields
/// between the in-memory change and its persistence.
pub trait LocalStore: Send + Sync {
    /// Read the value stored under `key`, or `None` if it was never written.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write (insert or replace) `value` under `key`.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Write several keys. Backends with transactions should make this atomic;
    /// the default writes in order and stops at the first failure.
    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }
}
