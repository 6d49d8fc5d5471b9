//! LocalCache — last known state of every record, keyed by `id`.
//!
//! Insertion order is preserved; sorting by observation date is left to the
//! display layer. The cache never holds two entries with the same `id`.

use crate::types::Record;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalCache {
    records: Vec<Record>,
}

impl LocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cache from `records`, keeping the last entry for a repeated `id`.
    pub fn from_records(records: Vec<Record>) -> Self {
        let mut cache = Self::new();
        cache.replace_all(records);
        cache
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    /// Replace the entry with the same `id` in place, or append.
    pub fn upsert(&mut self, record: Record) {
        match self.position(&record.id) {
            Some(i) => self.records[i] = record,
            None => self.records.push(record),
        }
    }

    /// Remove the entry with `id`. Returns the removed record, if any.
    pub fn remove(&mut self, id: &str) -> Option<Record> {
        self.position(id).map(|i| self.records.remove(i))
    }

    /// Overwrite the whole cache (after a full remote fetch or an import).
    pub fn replace_all(&mut self, records: Vec<Record>) {
        self.records.clear();
        for record in records {
            self.upsert(record);
        }
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.records.iter().position(|r| r.id == id)
    }
}
