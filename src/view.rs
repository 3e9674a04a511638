use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;

use crate::history::normalize;
use crate::listing::DisplayRecord;

/// Which table rows and history entries are expanded. Survives snapshot
/// swaps because it is keyed by record id, not position.
#[derive(Debug, Clone, Default)]
pub struct ExpansionState {
    rows: HashSet<String>,
    entries: HashSet<(String, String)>,
}

impl ExpansionState {
    pub fn toggle_row(&mut self, row_id: &str) -> bool {
        toggle(&mut self.rows, row_id.to_string())
    }

    pub fn toggle_entry(&mut self, row_id: &str, history_key: &str) -> bool {
        toggle(
            &mut self.entries,
            (row_id.to_string(), history_key.to_string()),
        )
    }

    pub fn is_row_open(&self, row_id: &str) -> bool {
        self.rows.contains(row_id)
    }

    pub fn is_entry_open(&self, row_id: &str, history_key: &str) -> bool {
        self.entries
            .contains(&(row_id.to_string(), history_key.to_string()))
    }

    /// Drops state for rows that are no longer in the table.
    pub fn retain_rows<'a, I>(&mut self, live: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let live: HashSet<&str> = live.into_iter().collect();
        self.rows.retain(|row| live.contains(row.as_str()));
        self.entries.retain(|(row, _)| live.contains(row.as_str()));
    }
}

fn toggle<T: Eq + std::hash::Hash>(set: &mut HashSet<T>, key: T) -> bool {
    if set.remove(&key) {
        false
    } else {
        set.insert(key);
        true
    }
}

/// One line of an expanded record's history, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryLine {
    pub key: String,
    pub label: String,
    pub location: String,
    pub direction: String,
    pub raw: Value,
    pub open: bool,
}

pub fn history_lines(record: &DisplayRecord, expansion: &ExpansionState) -> Vec<HistoryLine> {
    normalize(&record.record)
        .into_iter()
        .map(|entry| HistoryLine {
            open: expansion.is_entry_open(&record.id, &entry.key),
            label: entry.label(),
            location: entry.location_text(),
            direction: entry.direction_text(),
            raw: entry.raw,
            key: entry.key,
        })
        .collect()
}
