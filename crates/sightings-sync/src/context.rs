//! SyncContext — the object the application root owns and hands to the UI.
//!
//! Reads always come from the local cache. Mutations go through the
//! connectivity gate: straight to the remote store when that is safe,
//! otherwise into the pending log with the cache updated optimistically.
//! A failed remote call degrades to the deferred path, except when no user
//! has ever signed in.

use std::sync::Arc;
use std::time::Duration;

use crate::connectivity::{ConnectivityGate, Route, Transition};
use crate::error::{RemoteError, Result, SyncError};
use crate::events::{EventEmitter, ListenerId, SyncEvent};
use crate::queue::{Operation, OperationKind, PendingOperation};
use crate::replica::Replica;
use crate::storage::LocalStore;
use crate::sync::engine::bounded;
use crate::sync::import::merge_records;
use crate::sync::types::{DrainOutcome, DrainReport, ImportReport, RemoteStore, SyncOptions};
use crate::sync::SyncEngine;
use crate::types::{placeholder_id, Record};

pub struct SyncContext {
    replica: Arc<Replica>,
    remote: Arc<dyn RemoteStore>,
    gate: Arc<ConnectivityGate>,
    engine: SyncEngine,
    events: EventEmitter,
    timeout: Duration,
}

impl SyncContext {
    /// Load the replica from `local` and wire the engine to `remote`.
    ///
    /// Starts offline unless `options.start_online` says otherwise. Call
    /// [`drain_queue`](Self::drain_queue) once at startup to flush operations
    /// left over from a previous run.
    pub fn open(
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        options: SyncOptions,
    ) -> Result<Self> {
        let replica = Arc::new(Replica::load(local, options.store_keys())?);
        let gate = Arc::new(ConnectivityGate::new(options.start_online.unwrap_or(false)));
        let engine = SyncEngine::new(
            Arc::clone(&replica),
            Arc::clone(&remote),
            Arc::clone(&gate),
            &options,
        );
        Ok(Self {
            replica,
            remote,
            gate,
            engine,
            events: EventEmitter::new(),
            timeout: options.remote_timeout(),
        })
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn list(&self) -> Vec<Record> {
        self.replica.list()
    }

    pub fn get(&self, id: &str) -> Option<Record> {
        self.replica.get(id)
    }

    pub fn pending(&self) -> Vec<PendingOperation> {
        self.replica.pending()
    }

    pub fn pending_len(&self) -> usize {
        self.replica.pending_len()
    }

    /// Operations that hit the retry ceiling and need manual resolution.
    pub fn stalled(&self) -> Vec<PendingOperation> {
        self.replica.stalled()
    }

    pub fn is_online(&self) -> bool {
        self.gate.is_online()
    }

    pub fn is_draining(&self) -> bool {
        self.engine.is_draining()
    }

    // -----------------------------------------------------------------------
    // Notifications
    // -----------------------------------------------------------------------

    pub fn subscribe(&self, callback: impl Fn(&SyncEvent) + Send + Sync + 'static) -> ListenerId {
        self.events.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: ListenerId) {
        self.events.unsubscribe(id)
    }

    // -----------------------------------------------------------------------
    // Connectivity
    // -----------------------------------------------------------------------

    /// Record the hosting environment's connectivity signal. An
    /// offline→online transition runs one drain and returns its report.
    pub async fn set_online(&self, online: bool) -> Result<Option<DrainReport>> {
        match self.gate.set_online(online) {
            Transition::Unchanged => Ok(None),
            Transition::WentOffline => {
                tracing::info!(pending = self.pending_len(), "went offline");
                self.events.emit(&SyncEvent::ConnectivityChanged { online: false });
                Ok(None)
            }
            Transition::WentOnline => {
                tracing::info!(pending = self.pending_len(), "back online, draining queue");
                self.events.emit(&SyncEvent::ConnectivityChanged { online: true });
                self.drain_queue().await.map(Some)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Create a record. Returns it with its server ID, or with a placeholder
    /// ID when the create was deferred.
    pub async fn create(&self, record: Record) -> Result<Record> {
        if self.route(OperationKind::Insert, &record.id) == Route::Remote {
            let mut outbound = record.clone();
            if outbound.has_placeholder_id() {
                outbound.id.clear();
            }
            match bounded(self.timeout, self.remote.create(&outbound)).await {
                Ok(confirmed) => {
                    self.replica.confirm_created(&record.id, confirmed.clone())?;
                    self.events.emit(&SyncEvent::CacheChanged);
                    return Ok(confirmed);
                }
                Err(e) => self.absorb("create", &record.id, e)?,
            }
        }

        let mut record = record;
        if !record.has_id() {
            record.id = placeholder_id();
        }
        self.replica.defer(Operation::Insert(record.clone()))?;
        self.events.emit(&SyncEvent::CacheChanged);
        Ok(record)
    }

    /// Replace the record with `record.id`.
    pub async fn update(&self, record: Record) -> Result<Record> {
        if !record.has_id() {
            return Err(SyncError::InvalidRecord("update requires an id".to_string()));
        }
        if self.route(OperationKind::Update, &record.id) == Route::Remote {
            match bounded(self.timeout, self.remote.update(&record)).await {
                Ok(()) => {
                    self.replica.confirm_upsert(record.clone())?;
                    self.events.emit(&SyncEvent::CacheChanged);
                    return Ok(record);
                }
                Err(e) => self.absorb("update", &record.id, e)?,
            }
        }

        self.replica.defer(Operation::Update(record.clone()))?;
        self.events.emit(&SyncEvent::CacheChanged);
        Ok(record)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(SyncError::InvalidRecord("delete requires an id".to_string()));
        }
        if self.route(OperationKind::Delete, id) == Route::Remote {
            match bounded(self.timeout, self.remote.delete(id)).await {
                Ok(()) => {
                    self.replica.confirm_delete(id)?;
                    self.events.emit(&SyncEvent::CacheChanged);
                    return Ok(());
                }
                Err(e) => self.absorb("delete", id, e)?,
            }
        }

        self.replica.defer(Operation::Delete { id: id.to_string() })?;
        self.events.emit(&SyncEvent::CacheChanged);
        Ok(())
    }

    /// Fold an external batch into the record set (last writer wins by `id`).
    ///
    /// Online, the combined set is bulk-upserted and becomes the new cache.
    /// Offline, or when the upload fails, the import is replayed through the
    /// pending log instead.
    pub async fn import_batch(&self, records: Vec<Record>) -> Result<ImportReport> {
        let incoming: Vec<Record> = records
            .into_iter()
            .map(|mut r| {
                if !r.has_id() {
                    r.id = placeholder_id();
                }
                r
            })
            .collect();

        let plan = merge_records(&self.replica.list(), incoming);
        let mut report = ImportReport {
            replaced: plan.replaced(),
            added: plan.added(),
            uploaded: false,
            queued: 0,
        };
        let imported: Vec<Record> = plan.incoming.iter().map(|(r, _)| r.clone()).collect();

        let overlaps_log = imported.iter().any(|r| self.replica.has_pending_for(&r.id));
        if self.gate.is_online() && !overlaps_log {
            let upload: Vec<Record> = plan
                .uploadable()
                .into_iter()
                .filter(|r| !self.replica.has_pending_for(&r.id))
                .collect();
            match bounded(self.timeout, self.remote.bulk_upsert(&upload)).await {
                Ok(()) => {
                    let queued = plan.placeholder_inserts();
                    report.uploaded = true;
                    report.queued = queued.len();
                    self.replica.apply_import(imported, queued)?;
                    tracing::info!(uploaded = upload.len(), queued = report.queued, "import uploaded");
                    self.events.emit(&SyncEvent::CacheChanged);
                    return Ok(report);
                }
                Err(e) => self.absorb("import", "", e)?,
            }
        }

        let queued = plan.as_operations();
        report.queued = queued.len();
        self.replica.apply_import(imported, queued)?;
        tracing::info!(queued = report.queued, "import deferred to pending log");
        self.events.emit(&SyncEvent::CacheChanged);
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Sync
    // -----------------------------------------------------------------------

    /// Drain the pending log. Call at startup and on reconnect.
    pub async fn drain_queue(&self) -> Result<DrainReport> {
        let report = self.engine.drain().await?;
        if !matches!(report.outcome, DrainOutcome::Skipped(_)) {
            self.events.emit(&SyncEvent::Drained(report.clone()));
            if report.refreshed {
                self.events.emit(&SyncEvent::CacheChanged);
            }
        }
        Ok(report)
    }

    /// Make stalled operations eligible for the next drain.
    pub async fn retry_stalled(&self) -> Result<usize> {
        let count = self.engine.retry_stalled().await?;
        if count > 0 {
            tracing::info!(count, "stalled operations re-armed");
        }
        Ok(count)
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn route(&self, kind: OperationKind, id: &str) -> Route {
        let route = self.gate.route(kind, id, self.replica.has_pending_for(id));
        if let Route::Defer(reason) = route {
            tracing::debug!(?kind, id = %id, ?reason, "deferring to pending log");
        }
        route
    }

    /// Turn a remote failure on the mutation path into "defer", unless it
    /// cannot be attributed to any user.
    fn absorb(&self, action: &str, id: &str, e: RemoteError) -> Result<()> {
        if !e.kind.is_recoverable() {
            return Err(SyncError::NotAuthenticated(e.message));
        }
        tracing::warn!(
            action,
            id = %id,
            error_kind = ?e.kind,
            error = %e,
            "remote call failed, deferring to pending log"
        );
        Ok(())
    }
}
