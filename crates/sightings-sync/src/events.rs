//! Change notifications for the UI layer.
//!
//! Listeners are stored as `Arc<dyn Fn(&SyncEvent)>` and invoked from a
//! snapshot taken under the lock, so a listener may subscribe or unsubscribe
//! while an event is being delivered. A panicking listener is isolated and
//! does not prevent delivery to the others.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::sync::types::DrainReport;

/// Something the UI may want to re-render for.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// The local cache changed; `list()` returns new content.
    CacheChanged,
    ConnectivityChanged { online: bool },
    /// A drain finished (skipped drains are not reported).
    Drained(DrainReport),
}

pub type ListenerId = u64;

type Listener = dyn Fn(&SyncEvent) + Send + Sync;

pub struct EventEmitter {
    listeners: Mutex<Vec<(ListenerId, Arc<Listener>)>>,
    next_id: AtomicU64,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self, callback: impl Fn(&SyncEvent) + Send + Sync + 'static) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::new(callback)));
        id
    }

    /// Remove a listener. Unknown IDs are ignored.
    pub fn unsubscribe(&self, id: ListenerId) {
        self.listeners.lock().retain(|(lid, _)| *lid != id);
    }

    pub fn emit(&self, event: &SyncEvent) {
        let snapshot: Vec<Arc<Listener>> = {
            let guard = self.listeners.lock();
            guard.iter().map(|(_, cb)| Arc::clone(cb)).collect()
        };
        for cb in snapshot {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(event)));
            if outcome.is_err() {
                tracing::warn!(?event, "sync event listener panicked");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
