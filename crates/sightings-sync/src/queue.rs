//! Pending operation log — durable FIFO of unconfirmed mutations.
//!
//! Serialized as a JSON array of `{ kind, payload, enqueuedAt, ... }` objects.
//! Operations leave the log only when the remote store confirms them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
}

/// A mutation and its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum Operation {
    Insert(Record),
    Update(Record),
    Delete { id: String },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Insert(_) => OperationKind::Insert,
            Self::Update(_) => OperationKind::Update,
            Self::Delete { .. } => OperationKind::Delete,
        }
    }

    /// ID of the record this operation targets.
    pub fn record_id(&self) -> &str {
        match self {
            Self::Insert(record) | Self::Update(record) => &record.id,
            Self::Delete { id } => id,
        }
    }

    fn set_record_id(&mut self, new_id: String) {
        match self {
            Self::Insert(record) | Self::Update(record) => record.id = new_id,
            Self::Delete { id } => *id = new_id,
        }
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    #[serde(flatten)]
    pub operation: Operation,
    pub enqueued_at: DateTime<Utc>,
    /// Failed submission attempts so far.
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Set once `attempts` reaches the configured ceiling; skipped by drains
    /// until explicitly retried.
    #[serde(default, skip_serializing_if = "is_false")]
    pub stalled: bool,
}

impl PendingOperation {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            enqueued_at: Utc::now(),
            attempts: 0,
            last_error: None,
            stalled: false,
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.operation.kind()
    }

    pub fn record_id(&self) -> &str {
        self.operation.record_id()
    }

    /// Record a failed attempt; stall once `max_attempts` is reached.
    pub fn record_failure(&mut self, error: impl Into<String>, max_attempts: Option<u32>) {
        self.attempts = self.attempts.saturating_add(1);
        self.last_error = Some(error.into());
        if let Some(max) = max_attempts {
            if self.attempts >= max {
                self.stalled = true;
            }
        }
    }
}

/// Ordered log of pending operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingLog {
    ops: Vec<PendingOperation>,
}

impl PendingLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ops(ops: Vec<PendingOperation>) -> Self {
        Self { ops }
    }

    pub fn push(&mut self, op: PendingOperation) {
        self.ops.push(op);
    }

    pub fn ops(&self) -> &[PendingOperation] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Whether any queued operation targets `id`.
    pub fn has_pending_for(&self, id: &str) -> bool {
        self.ops.iter().any(|op| op.record_id() == id)
    }

    /// Operations appended after the first `n` entries.
    pub fn tail_after(&self, n: usize) -> &[PendingOperation] {
        self.ops.get(n..).unwrap_or(&[])
    }

    pub fn replace(&mut self, ops: Vec<PendingOperation>) {
        self.ops = ops;
    }

    pub fn stalled(&self) -> Vec<PendingOperation> {
        self.ops.iter().filter(|op| op.stalled).cloned().collect()
    }

    /// Clear the stalled flag and attempt counters. Returns how many were stalled.
    pub fn retry_stalled(&mut self) -> usize {
        let mut count = 0;
        for op in self.ops.iter_mut().filter(|op| op.stalled) {
            op.stalled = false;
            op.attempts = 0;
            count += 1;
        }
        count
    }

    /// Rewrite placeholder IDs that have since been assigned a server ID.
    pub fn resolve_aliases(&mut self, aliases: &HashMap<String, String>) {
        for op in &mut self.ops {
            resolve_alias(&mut op.operation, aliases);
        }
    }
}

/// Rewrite the target ID of `operation` if it is a known placeholder.
pub fn resolve_alias(operation: &mut Operation, aliases: &HashMap<String, String>) {
    if let Some(server_id) = aliases.get(operation.record_id()) {
        operation.set_record_id(server_id.clone());
    }
}
