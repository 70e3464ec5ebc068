use std::fmt;
use std::time::SystemTime;

use serde::Serialize;
use serde_json::Value;

use crate::config::ThrottleInterval;
use crate::state::merge::ChangeReport;
use crate::state::record::{ID_FIELD, Record};
use crate::state::record_table::RecordTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Toggle {
    #[serde(rename = "ON")]
    On,
    #[serde(rename = "OFF")]
    Off,
}

impl From<bool> for Toggle {
    fn from(on: bool) -> Self {
        if on { Toggle::On } else { Toggle::Off }
    }
}

impl fmt::Display for Toggle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Toggle::On => "ON",
            Toggle::Off => "OFF",
        })
    }
}

/// Case-insensitive "field contains text" predicate set by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFilter {
    pub field: String,
    pub needle: String,
}

impl RowFilter {
    pub fn new(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            needle: needle.into().to_lowercase(),
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        let text = if self.field == ID_FIELD {
            record.id().to_string()
        } else {
            match record.get(&self.field) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => return false,
                Some(other) => other.to_string(),
            }
        };
        text.to_lowercase().contains(&self.needle)
    }
}

/// Counters shown in the status bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub total_count: usize,
    pub filtered_count: usize,
    pub total_tickers: usize,
    pub selected_tickers: usize,
    pub subscribed_tickers: usize,
    pub last_update: Option<SystemTime>,
    pub updated_count: usize,
    pub deleted_count: usize,
    pub connection_status: Toggle,
    pub subscription_status: Toggle,
    pub throttle_ms: u64,
}

/// Everything the status bar is derived from.
pub struct StatusInputs<'a> {
    pub table: &'a RecordTable,
    pub last_report: &'a ChangeReport,
    pub filter: Option<&'a RowFilter>,
    pub catalog_len: usize,
    pub selected_len: usize,
    pub subscribed_len: usize,
    pub last_merge: Option<SystemTime>,
    pub connected: bool,
    pub subscribed: bool,
    pub throttle: ThrottleInterval,
}

/// Pure derivation; holds no state of its own.
pub struct StatusAggregator;

impl StatusAggregator {
    pub fn derive(inputs: &StatusInputs<'_>) -> StatusSnapshot {
        let filtered_count = inputs
            .filter
            .map(|filter| inputs.table.iter().filter(|r| filter.matches(r)).count())
            .unwrap_or(0);

        StatusSnapshot {
            total_count: inputs.table.len(),
            filtered_count,
            total_tickers: inputs.catalog_len,
            selected_tickers: inputs.selected_len,
            subscribed_tickers: inputs.subscribed_len,
            last_update: inputs.last_merge,
            updated_count: inputs.last_report.updated_count,
            deleted_count: inputs.last_report.deleted_count,
            connection_status: inputs.connected.into(),
            subscription_status: inputs.subscribed.into(),
            throttle_ms: inputs.throttle.as_millis(),
        }
    }
}
