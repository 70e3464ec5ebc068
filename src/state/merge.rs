//! Applies batches of partial updates to a [`RecordTable`].
//!
//! Payloads are applied strictly in order, so a later value for the same
//! field wins. Tombstones soft-delete; absent fields are never cleared.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::debug;

use crate::state::record::{Record, RecordId, UpdatePayload};
use crate::state::record_table::RecordTable;

/// Summary of one merge call, used for highlighting and status counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeReport {
    /// Existing rows whose values changed, with the changed field names in
    /// first-change order.
    pub changed: BTreeMap<RecordId, Vec<String>>,
    /// Rows created by this batch.
    pub inserted: BTreeSet<RecordId>,
    /// Rows left inactive by this batch.
    pub deleted: BTreeSet<RecordId>,
    /// Non-tombstone payloads applied, including redundant resends.
    pub updated_count: usize,
    /// Tombstones applied to existing rows.
    pub deleted_count: usize,
    /// Set by the engine on the flush that carries a freshly derived column layout.
    pub schema_established: bool,
}

impl ChangeReport {
    pub fn is_empty(&self) -> bool {
        self.updated_count == 0 && self.deleted_count == 0
    }
}

/// Merges `updates` into `table` and returns the new snapshot.
///
/// The input `Arc` is consumed: if the caller (or a consumer) still holds
/// another handle, the table is cloned first and that handle keeps seeing
/// the old snapshot.
pub fn merge<I>(table: Arc<RecordTable>, updates: I) -> (Arc<RecordTable>, ChangeReport)
where
    I: IntoIterator<Item = UpdatePayload>,
{
    let mut table = table;
    let mut report = ChangeReport::default();
    let mut dropped = 0usize;

    {
        let rows = Arc::make_mut(&mut table);
        for payload in updates {
            let Some(id) = payload.id.clone() else {
                dropped += 1;
                continue;
            };
            apply_payload(rows, id, &payload, &mut report);
        }
    }

    debug!(
        updated = report.updated_count,
        deleted = report.deleted_count,
        changed = report.changed.len(),
        inserted = report.inserted.len(),
        dropped,
        rows = table.len(),
        "merged update batch"
    );

    (table, report)
}

fn apply_payload(
    table: &mut RecordTable,
    id: RecordId,
    payload: &UpdatePayload,
    report: &mut ChangeReport,
) {
    if payload.is_tombstone() {
        // Cannot delete what is not present.
        if let Some(existing) = table.get_mut(&id) {
            existing.set_active(false);
            report.deleted_count += 1;
            report.deleted.insert(id);
        }
        return;
    }

    report.updated_count += 1;
    report.deleted.remove(&id);

    match table.get_mut(&id) {
        Some(existing) => {
            for (field, value) in &payload.fields {
                if existing.apply_field(field, value) {
                    let columns = report.changed.entry(id.clone()).or_default();
                    if !columns.iter().any(|c| c == field) {
                        columns.push(field.clone());
                    }
                }
            }
            existing.set_active(true);
        }
        None => {
            report.inserted.insert(id.clone());
            table.insert(Record::new(id, payload.fields.clone()));
        }
    }
}
