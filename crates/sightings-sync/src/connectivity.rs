//! Connectivity gate — routes every mutation to the remote store or to the
//! pending log, and reports offline→online transitions.
//!
//! `is_online` is a point-in-time signal. A remote call may still fail right
//! after it returned `true`; callers treat that failure as being offline.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::queue::OperationKind;
use crate::types::is_placeholder_id;

/// Outcome of recording a new connectivity signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    WentOnline,
    WentOffline,
    Unchanged,
}

/// Why a mutation was sent to the pending log instead of the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferReason {
    Offline,
    /// The target still has a placeholder ID the remote store has never seen.
    PlaceholderId,
    /// Earlier operations for the same record are still queued.
    PendingAhead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Remote,
    Defer(DeferReason),
}

#[derive(Debug, Default)]
pub struct ConnectivityGate {
    online: AtomicBool,
}

impl ConnectivityGate {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Record the hosting environment's connectivity signal.
    pub fn set_online(&self, online: bool) -> Transition {
        let previous = self.online.swap(online, Ordering::SeqCst);
        match (previous, online) {
            (false, true) => Transition::WentOnline,
            (true, false) => Transition::WentOffline,
            _ => Transition::Unchanged,
        }
    }

    /// Decide where a mutation of `kind` on `target_id` goes.
    ///
    /// `target_id` is empty for a create without an ID. `pending_for_target`
    /// tells whether the log already holds operations for that record.
    pub fn route(&self, kind: OperationKind, target_id: &str, pending_for_target: bool) -> Route {
        if !self.is_online() {
            return Route::Defer(DeferReason::Offline);
        }
        if is_placeholder_id(target_id) && kind != OperationKind::Insert {
            return Route::Defer(DeferReason::PlaceholderId);
        }
        if !target_id.is_empty() && pending_for_target {
            return Route::Defer(DeferReason::PendingAhead);
        }
        Route::Remote
    }
}
