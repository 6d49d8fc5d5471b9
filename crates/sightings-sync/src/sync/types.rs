//! Sync-specific types: remote store trait, options and drain reports.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::replica::StoreKeys;
use crate::types::Record;

// ============================================================================
// RemoteStore — user-provided network layer
// ============================================================================

/// The authoritative store, reached over the network.
///
/// Implementations handle transport and authentication. `update` must have
/// upsert semantics so that a replayed operation is harmless.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<Record>, RemoteError>;

    /// Create a record. The store assigns (or corrects) the `id` and returns
    /// the confirmed record.
    async fn create(&self, record: &Record) -> Result<Record, RemoteError>;

    /// Insert or replace the record with `record.id`.
    async fn update(&self, record: &Record) -> Result<(), RemoteError>;

    async fn delete(&self, id: &str) -> Result<(), RemoteError>;

    async fn bulk_upsert(&self, records: &[Record]) -> Result<(), RemoteError>;
}

// ============================================================================
// Options
// ============================================================================

const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for `SyncContext`.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Bound on every remote call (`None` = 10 s). A timed-out call counts as
    /// a transient failure.
    pub remote_timeout: Option<Duration>,
    /// Failed attempts before a queued operation is stalled. `None` retries
    /// forever.
    pub max_attempts: Option<u32>,
    /// Durable-store key for the local cache (`None` = `"cache"`).
    pub cache_key: Option<String>,
    /// Durable-store key for the pending log (`None` = `"queue"`).
    pub queue_key: Option<String>,
    /// Durable-store key for the placeholder alias table (`None` = `"aliases"`).
    pub alias_key: Option<String>,
    /// Connectivity assumed at startup (`None` = offline until told otherwise).
    pub start_online: Option<bool>,
}

impl SyncOptions {
    pub fn remote_timeout(&self) -> Duration {
        self.remote_timeout.unwrap_or(DEFAULT_REMOTE_TIMEOUT)
    }

    /// `Some(0)` is treated as `Some(1)`.
    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts.map(|n| n.max(1))
    }

    pub fn store_keys(&self) -> StoreKeys {
        let defaults = StoreKeys::default();
        StoreKeys {
            cache: self.cache_key.clone().unwrap_or(defaults.cache),
            queue: self.queue_key.clone().unwrap_or(defaults.queue),
            aliases: self.alias_key.clone().unwrap_or(defaults.aliases),
        }
    }
}

// ============================================================================
// Drain Result Types
// ============================================================================

/// Why a drain did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Offline,
    Empty,
    /// Another drain of the same log is in flight.
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    Skipped(SkipReason),
    /// The log ended empty.
    Drained,
    /// Some operations remain queued.
    Partial,
}

/// Drain-level diagnostics. Per-item failures are logged, never returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub outcome: DrainOutcome,
    /// Operations sent to the remote store.
    pub submitted: usize,
    pub succeeded: usize,
    /// Operations left in the log after the pass (including stalled ones).
    pub retained: usize,
    /// Operations skipped because they are stalled.
    pub stalled: usize,
    /// Whether the cache was replaced by a full remote fetch.
    pub refreshed: bool,
}

impl DrainReport {
    pub fn skipped(reason: SkipReason) -> Self {
        Self {
            outcome: DrainOutcome::Skipped(reason),
            submitted: 0,
            succeeded: 0,
            retained: 0,
            stalled: 0,
            refreshed: false,
        }
    }

    pub fn is_fully_drained(&self) -> bool {
        self.outcome == DrainOutcome::Drained
    }
}

/// Result of `SyncContext::import_batch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    /// Incoming records that replaced an existing record.
    pub replaced: usize,
    /// Incoming records appended as new.
    pub added: usize,
    /// Whether the merged set reached the remote store in a bulk upsert.
    pub uploaded: bool,
    /// Operations queued instead (offline, failed upload, placeholder IDs).
    pub queued: usize,
}
