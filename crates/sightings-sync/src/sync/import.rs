//! Merge-import reconciliation.
//!
//! Folds an externally supplied batch (backup restore, spreadsheet import)
//! into the current record set by `id`. A matching record is replaced whole
//! (last writer wins, no field-level merge); anything else is appended. The
//! fold is sequential, so a repeated `id` within the batch resolves to the
//! last occurrence.

use std::collections::HashSet;

use crate::queue::Operation;
use crate::types::Record;

/// Result of folding an incoming batch into the current set.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportPlan {
    /// Combined collection: the new cache content.
    pub merged: Vec<Record>,
    /// Final version of each distinct incoming record, in first-seen order,
    /// with whether it replaced a record already present.
    pub incoming: Vec<(Record, bool)>,
}

impl ImportPlan {
    pub fn replaced(&self) -> usize {
        self.incoming.iter().filter(|(_, existed)| *existed).count()
    }

    pub fn added(&self) -> usize {
        self.incoming.len() - self.replaced()
    }

    /// Records that may be sent to the remote store as-is.
    pub fn uploadable(&self) -> Vec<Record> {
        self.merged
            .iter()
            .filter(|r| !r.has_placeholder_id())
            .cloned()
            .collect()
    }

    /// Incoming records that still carry a placeholder ID. These can only
    /// reach the remote store through a queued create.
    pub fn placeholder_inserts(&self) -> Vec<Operation> {
        self.incoming
            .iter()
            .filter(|(r, _)| r.has_placeholder_id())
            .map(|(r, existed)| to_operation(r, *existed))
            .collect()
    }

    /// Operations that reproduce the import through the pending log.
    pub fn as_operations(&self) -> Vec<Operation> {
        self.incoming
            .iter()
            .map(|(r, existed)| to_operation(r, *existed))
            .collect()
    }
}

fn to_operation(record: &Record, existed: bool) -> Operation {
    if existed {
        Operation::Update(record.clone())
    } else {
        Operation::Insert(record.clone())
    }
}

/// Fold `incoming` into `current`. Every incoming record must already carry
/// an `id`.
pub fn merge_records(current: &[Record], incoming: Vec<Record>) -> ImportPlan {
    let existing: HashSet<&str> = current.iter().map(|r| r.id.as_str()).collect();
    let mut merged: Vec<Record> = current.to_vec();
    let mut seen: Vec<(Record, bool)> = Vec::new();

    for record in incoming {
        match merged.iter().position(|r| r.id == record.id) {
            Some(i) => merged[i] = record.clone(),
            None => merged.push(record.clone()),
        }
        match seen.iter().position(|(r, _)| r.id == record.id) {
            Some(i) => seen[i].0 = record,
            None => {
                let existed = existing.contains(record.id.as_str());
                seen.push((record, existed));
            }
        }
    }

    ImportPlan {
        merged,
        incoming: seen,
    }
}
