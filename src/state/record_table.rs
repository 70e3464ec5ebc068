use std::collections::BTreeMap;

use serde_json::Value;

use crate::state::record::{Record, RecordId};

/// Keyed snapshot of every ticker row seen on the current connection.
///
/// Rows are soft-deleted (`is_active == false`), never removed; only a
/// reset replaces the table. Iteration follows `RecordId` order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordTable {
    records: BTreeMap<RecordId, Record>,
}

impl RecordTable {
    pub fn new() -> Self {
        RecordTable {
            records: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.records.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub fn active_count(&self) -> usize {
        self.records.values().filter(|r| r.is_active()).count()
    }

    pub fn to_rows(&self) -> Vec<Value> {
        self.records.values().map(Record::to_row).collect()
    }

    pub(crate) fn get_mut(&mut self, id: &RecordId) -> Option<&mut Record> {
        self.records.get_mut(id)
    }

    pub(crate) fn insert(&mut self, record: Record) {
        self.records.insert(record.id().clone(), record);
    }
}
