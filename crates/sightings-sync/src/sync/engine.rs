//! SyncEngine — drains the pending log against the remote store.
//!
//! One pass submits queued operations strictly in enqueue order. Successful
//! operations leave the log; failed ones are retained for the next pass.
//! Only when the log ends empty is the cache replaced by a full remote fetch.
//! `drain` never returns per-item failures; it fails only when the local
//! durable store does.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as TokioMutex;

use crate::connectivity::ConnectivityGate;
use crate::error::{RemoteError, RemoteErrorKind, Result};
use crate::queue::{resolve_alias, Operation, PendingOperation};
use crate::replica::Replica;
use crate::types::is_placeholder_id;

use super::types::{DrainOutcome, DrainReport, RemoteStore, SkipReason, SyncOptions};

/// Run `fut` with an upper bound. Elapsing counts as a timeout failure.
pub(crate) async fn bounded<T>(
    timeout: Duration,
    fut: impl Future<Output = std::result::Result<T, RemoteError>>,
) -> std::result::Result<T, RemoteError> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(RemoteError::with_kind(
            format!("remote call timed out after {timeout:?}"),
            RemoteErrorKind::Timeout,
        )),
    }
}

/// What a successful submission did.
enum Submitted {
    /// A placeholder record was created; the store assigned `server_id`.
    Created { placeholder: String, server_id: String },
    Applied,
    /// Nothing to send (delete of a record the store never saw).
    Skipped,
}

// ============================================================================
// SyncEngine
// ============================================================================

pub struct SyncEngine {
    replica: Arc<Replica>,
    remote: Arc<dyn RemoteStore>,
    gate: Arc<ConnectivityGate>,
    timeout: Duration,
    max_attempts: Option<u32>,
    /// Held for the whole pass; a second drain that cannot take it is skipped.
    drain_lock: TokioMutex<()>,
}

impl SyncEngine {
    pub fn new(
        replica: Arc<Replica>,
        remote: Arc<dyn RemoteStore>,
        gate: Arc<ConnectivityGate>,
        options: &SyncOptions,
    ) -> Self {
        Self {
            replica,
            remote,
            gate,
            timeout: options.remote_timeout(),
            max_attempts: options.max_attempts(),
            drain_lock: TokioMutex::new(()),
        }
    }

    pub fn is_draining(&self) -> bool {
        self.drain_lock.try_lock().is_err()
    }

    /// Run one drain pass.
    pub async fn drain(&self) -> Result<DrainReport> {
        if !self.gate.is_online() {
            return Ok(DrainReport::skipped(SkipReason::Offline));
        }
        let Ok(_guard) = self.drain_lock.try_lock() else {
            tracing::debug!("drain already in flight, skipping");
            return Ok(DrainReport::skipped(SkipReason::AlreadyRunning));
        };

        let (snapshot, mut aliases) = self.replica.drain_snapshot();
        if snapshot.is_empty() {
            return Ok(DrainReport::skipped(SkipReason::Empty));
        }

        let drained = snapshot.len();
        let mut retained: Vec<PendingOperation> = Vec::new();
        // Records with a retained operation; later operations on them wait too.
        let mut blocked: HashSet<String> = HashSet::new();
        let mut submitted = 0;
        let mut succeeded = 0;
        let mut stalled = 0;

        for mut pending in snapshot {
            resolve_alias(&mut pending.operation, &aliases);
            let target = pending.record_id().to_string();

            if pending.stalled {
                stalled += 1;
                blocked.insert(target);
                retained.push(pending);
                continue;
            }
            if blocked.contains(&target) {
                retained.push(pending);
                continue;
            }

            submitted += 1;
            match self.submit(&pending.operation).await {
                Ok(Submitted::Created {
                    placeholder,
                    server_id,
                }) => {
                    tracing::debug!(placeholder = %placeholder, id = %server_id, "placeholder resolved");
                    if !placeholder.is_empty() {
                        aliases.insert(placeholder, server_id);
                    }
                    succeeded += 1;
                }
                Ok(Submitted::Applied) | Ok(Submitted::Skipped) => {
                    succeeded += 1;
                }
                Err(e) => {
                    pending.record_failure(e.message.clone(), self.max_attempts);
                    tracing::warn!(
                        id = %target,
                        kind = ?pending.kind(),
                        error_kind = ?e.kind,
                        attempts = pending.attempts,
                        error = %e,
                        "queued operation failed, retaining for next drain"
                    );
                    if pending.stalled {
                        tracing::warn!(
                            id = %target,
                            attempts = pending.attempts,
                            "queued operation stalled, needs manual resolution"
                        );
                    }
                    blocked.insert(target);
                    retained.push(pending);
                }
            }
        }

        let retained_count = retained.len();
        let remaining = self.replica.commit_drain(drained, retained, aliases)?;

        let mut report = DrainReport {
            outcome: if remaining == 0 {
                DrainOutcome::Drained
            } else {
                DrainOutcome::Partial
            },
            submitted,
            succeeded,
            retained: retained_count,
            stalled,
            refreshed: false,
        };

        if remaining == 0 {
            report.refreshed = self.refresh().await?;
        }

        tracing::info!(
            submitted = report.submitted,
            succeeded = report.succeeded,
            retained = report.retained,
            stalled = report.stalled,
            refreshed = report.refreshed,
            "drain finished"
        );
        Ok(report)
    }

    /// Replace the cache with a full remote fetch. A failed fetch leaves the
    /// cache as it is.
    async fn refresh(&self) -> Result<bool> {
        match bounded(self.timeout, self.remote.fetch_all()).await {
            Ok(records) => {
                if let Err(e) = self.replica.refresh(records) {
                    self.replica.abandon_refresh();
                    return Err(e);
                }
                Ok(true)
            }
            Err(e) => {
                self.replica.abandon_refresh();
                tracing::warn!(error = %e, "full refresh failed, keeping local cache");
                Ok(false)
            }
        }
    }

    /// Re-arm stalled operations. Waits for an in-flight drain, whose commit
    /// would otherwise overwrite the reset with its own copies.
    pub async fn retry_stalled(&self) -> Result<usize> {
        let _guard = self.drain_lock.lock().await;
        self.replica.retry_stalled()
    }

    async fn submit(&self, operation: &Operation) -> std::result::Result<Submitted, RemoteError> {
        match operation {
            Operation::Insert(record) | Operation::Update(record)
                if !record.has_id() || record.has_placeholder_id() =>
            {
                let mut outbound = record.clone();
                outbound.id = String::new();
                let created = bounded(self.timeout, self.remote.create(&outbound)).await?;
                Ok(Submitted::Created {
                    placeholder: record.id.clone(),
                    server_id: created.id,
                })
            }
            Operation::Insert(record) | Operation::Update(record) => {
                bounded(self.timeout, self.remote.update(record)).await?;
                Ok(Submitted::Applied)
            }
            Operation::Delete { id } if is_placeholder_id(id) => Ok(Submitted::Skipped),
            Operation::Delete { id } => {
                bounded(self.timeout, self.remote.delete(id)).await?;
                Ok(Submitted::Applied)
            }
        }
    }
}
