//! Replica — the durable client-side state: local cache, pending log and the
//! placeholder alias table.
//!
//! Every mutation is applied to a copy of the state, persisted with a single
//! `LocalStore::set_many`, and only then swapped in. The lock is never held
//! across an `.await`, so each read-modify-write sequence is atomic with
//! respect to the other callers.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;

use crate::cache::LocalCache;
use crate::error::{Result, StorageError};
use crate::queue::{Operation, PendingLog, PendingOperation};
use crate::storage::LocalStore;
use crate::types::Record;

/// Durable-store keys used by the replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreKeys {
    pub cache: String,
    pub queue: String,
    pub aliases: String,
}

impl Default for StoreKeys {
    fn default() -> Self {
        Self {
            cache: "cache".to_string(),
            queue: "queue".to_string(),
            aliases: "aliases".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct ReplicaState {
    cache: LocalCache,
    log: PendingLog,
    /// Placeholder ID → server-assigned ID, learned during drains.
    aliases: HashMap<String, String>,
    /// Cache effects confirmed outside the log while a full refresh is in
    /// flight. `Some` from a commit that emptied the log until the refresh
    /// lands or is abandoned. Never persisted.
    journal: Option<Vec<Operation>>,
}

impl ReplicaState {
    /// Apply a remote-confirmed effect that never goes through the log.
    fn apply_direct(&mut self, operation: Operation) {
        apply_optimistic(&mut self.cache, &operation);
        if let Some(journal) = self.journal.as_mut() {
            journal.push(operation);
        }
    }
}

/// Apply `operation` to the cache the way the UI expects to see it.
fn apply_optimistic(cache: &mut LocalCache, operation: &Operation) {
    match operation {
        Operation::Insert(record) | Operation::Update(record) => cache.upsert(record.clone()),
        Operation::Delete { id } => {
            cache.remove(id);
        }
    }
}

pub struct Replica {
    store: Arc<dyn LocalStore>,
    keys: StoreKeys,
    state: Mutex<ReplicaState>,
}

impl Replica {
    /// Load the replica from `store`. Missing keys start empty; unparseable
    /// values are reported as corruption.
    pub fn load(store: Arc<dyn LocalStore>, keys: StoreKeys) -> Result<Self> {
        let records: Vec<Record> = read_json(store.as_ref(), &keys.cache)?.unwrap_or_default();
        let ops: Vec<PendingOperation> =
            read_json(store.as_ref(), &keys.queue)?.unwrap_or_default();
        let aliases: HashMap<String, String> =
            read_json(store.as_ref(), &keys.aliases)?.unwrap_or_default();

        tracing::debug!(
            records = records.len(),
            pending = ops.len(),
            aliases = aliases.len(),
            "loaded replica"
        );

        Ok(Self {
            store,
            keys,
            state: Mutex::new(ReplicaState {
                cache: LocalCache::from_records(records),
                log: PendingLog::from_ops(ops),
                aliases,
                journal: None,
            }),
        })
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn list(&self) -> Vec<Record> {
        self.state.lock().cache.records().to_vec()
    }

    pub fn get(&self, id: &str) -> Option<Record> {
        self.state.lock().cache.get(id).cloned()
    }

    pub fn pending(&self) -> Vec<PendingOperation> {
        self.state.lock().log.ops().to_vec()
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().log.len()
    }

    pub fn has_pending_for(&self, id: &str) -> bool {
        self.state.lock().log.has_pending_for(id)
    }

    pub fn stalled(&self) -> Vec<PendingOperation> {
        self.state.lock().log.stalled()
    }

    pub fn aliases(&self) -> HashMap<String, String> {
        self.state.lock().aliases.clone()
    }

    // -----------------------------------------------------------------------
    // Mutation path
    // -----------------------------------------------------------------------

    /// Append `operation` to the log and apply it to the cache.
    pub fn defer(&self, operation: Operation) -> Result<()> {
        self.mutate(|state| {
            apply_optimistic(&mut state.cache, &operation);
            state.log.push(PendingOperation::new(operation));
        })
    }

    /// Store a record the remote store has confirmed.
    pub fn confirm_upsert(&self, record: Record) -> Result<()> {
        self.mutate(|state| state.apply_direct(Operation::Update(record)))
    }

    /// Store a record the remote store created, dropping the local entry it
    /// was created from if the store assigned a different `id`.
    pub fn confirm_created(&self, local_id: &str, record: Record) -> Result<()> {
        self.mutate(|state| {
            if !local_id.is_empty() && local_id != record.id {
                state.apply_direct(Operation::Delete {
                    id: local_id.to_string(),
                });
            }
            state.apply_direct(Operation::Insert(record));
        })
    }

    /// Drop a record the remote store has confirmed deleted.
    pub fn confirm_delete(&self, id: &str) -> Result<()> {
        self.mutate(|state| state.apply_direct(Operation::Delete { id: id.to_string() }))
    }

    /// Fold imported `records` into the cache by `id` and queue `operations`
    /// without re-applying them.
    pub fn apply_import(&self, records: Vec<Record>, operations: Vec<Operation>) -> Result<()> {
        self.mutate(|state| {
            for record in records {
                state.apply_direct(Operation::Update(record));
            }
            for operation in operations {
                state.log.push(PendingOperation::new(operation));
            }
        })
    }

    /// Reset stalled operations. Must not overlap a drain; see
    /// `SyncEngine::retry_stalled`.
    pub fn retry_stalled(&self) -> Result<usize> {
        self.mutate(|state| state.log.retry_stalled())
    }

    // -----------------------------------------------------------------------
    // Drain support
    // -----------------------------------------------------------------------

    /// Snapshot of the log and alias table taken at the start of a drain.
    pub fn drain_snapshot(&self) -> (Vec<PendingOperation>, HashMap<String, String>) {
        let state = self.state.lock();
        (state.log.ops().to_vec(), state.aliases.clone())
    }

    /// Replace the first `drained` log entries with `retained`, keeping any
    /// operations enqueued while the drain was in flight. Returns the
    /// resulting log length. The cache is not touched.
    ///
    /// When the log ends empty, direct confirmations are journaled from here
    /// on so [`refresh`](Self::refresh) can re-apply them on top of a fetch
    /// that may predate them.
    pub fn commit_drain(
        &self,
        drained: usize,
        retained: Vec<PendingOperation>,
        aliases: HashMap<String, String>,
    ) -> Result<usize> {
        self.mutate(|state| {
            let mut ops = retained;
            ops.extend(state.log.tail_after(drained).iter().cloned());
            state.log.replace(ops);
            state.aliases = aliases;
            state.log.resolve_aliases(&state.aliases);
            state.journal = state.log.is_empty().then(Vec::new);
            state.log.len()
        })
    }

    /// Replace the cache with a full remote fetch.
    ///
    /// Effects the remote store confirmed directly since the drain committed
    /// are re-applied first, then operations enqueued since, so neither is
    /// lost to a fetch taken before them. Placeholder aliases are folded into
    /// the log and then forgotten, since the fetched set carries only server
    /// IDs.
    pub fn refresh(&self, records: Vec<Record>) -> Result<()> {
        self.mutate(|state| {
            state.log.resolve_aliases(&state.aliases);
            state.aliases.clear();
            state.cache.replace_all(records);
            for operation in state.journal.take().unwrap_or_default() {
                apply_optimistic(&mut state.cache, &operation);
            }
            for op in state.log.ops() {
                apply_optimistic(&mut state.cache, &op.operation);
            }
        })
    }

    /// Stop journaling after a full refresh that could not be fetched.
    pub fn abandon_refresh(&self) {
        self.state.lock().journal = None;
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    fn mutate<T>(&self, f: impl FnOnce(&mut ReplicaState) -> T) -> Result<T> {
        let mut guard = self.state.lock();
        let mut next = guard.clone();
        let out = f(&mut next);
        self.persist(&next)?;
        *guard = next;
        Ok(out)
    }

    fn persist(&self, state: &ReplicaState) -> Result<()> {
        let cache = serde_json::to_string(state.cache.records())?;
        let queue = serde_json::to_string(state.log.ops())?;
        let aliases = serde_json::to_string(&state.aliases)?;
        self.store.set_many(&[
            (self.keys.cache.as_str(), cache.as_str()),
            (self.keys.queue.as_str(), queue.as_str()),
            (self.keys.aliases.as_str(), aliases.as_str()),
        ])
    }
}

fn read_json<T: DeserializeOwned>(store: &dyn LocalStore, key: &str) -> Result<Option<T>> {
    match store.get(key)? {
        None => Ok(None),
        Some(raw) => serde_json::from_str(&raw).map(Some).map_err(|source| {
            StorageError::Corruption {
                key: key.to_string(),
                source,
            }
            .into()
        }),
    }
}
