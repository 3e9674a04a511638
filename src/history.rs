use serde::Serialize;
use serde_json::{Map, Value};

use crate::probe::{
    aliases, display_text, non_blank, probe, probe_millis, probe_non_blank, text_or_placeholder,
};
use crate::timestamps::{format_local, is_timestamp_key, parse_time_label};

/// One normalized occurrence derived from a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    /// Stable key within the record: the time label, the event `_id`, or
    /// the array position (`events[3]`).
    pub key: String,
    /// Time label from a `timestamp` map or a legacy flat key. Array events
    /// never carry one, even when they have an `_id`.
    pub time_label: Option<String>,
    pub raw: Value,
    pub location: Option<Value>,
    pub direction: Option<Value>,
    pub name: Option<Value>,
    /// Epoch milliseconds, 0 when unresolved.
    pub timestamp_millis: i64,
}

impl HistoryEntry {
    fn from_event(
        key: String,
        time_label: Option<String>,
        raw: &Value,
        timestamp_millis: i64,
    ) -> Self {
        Self {
            key,
            time_label,
            location: probe(raw, aliases::LOCATION).cloned(),
            direction: probe(raw, aliases::DIRECTION).cloned(),
            name: probe(raw, aliases::ITEM_NAME).cloned(),
            raw: raw.clone(),
            timestamp_millis,
        }
    }

    pub fn has_label(&self) -> bool {
        self.time_label.is_some()
    }

    /// Label shown in history tables: the time label, else the resolved
    /// time, else empty.
    pub fn label(&self) -> String {
        if let Some(label) = &self.time_label {
            label.clone()
        } else if self.timestamp_millis > 0 {
            format_local(self.timestamp_millis)
        } else {
            String::new()
        }
    }

    pub fn location_text(&self) -> String {
        text_or_placeholder(
            self.location
                .as_ref()
                .and_then(non_blank)
                .or_else(|| probe_non_blank(&self.raw, aliases::LOCATION)),
        )
    }

    pub fn direction_text(&self) -> String {
        text_or_placeholder(
            self.direction
                .as_ref()
                .and_then(non_blank)
                .or_else(|| probe_non_blank(&self.raw, aliases::DIRECTION)),
        )
    }
}

/// Derives the ascending history of a record.
///
/// Shapes are additive: a `timestamp` map (or, without one, legacy top-level
/// time-label keys) contributes alongside any `events`/`reads`/`history`/`scans`
/// arrays. The final sort is stable, so entries without a resolvable time
/// keep their discovery order at the front.
pub fn normalize(record: &Value) -> Vec<HistoryEntry> {
    let Some(object) = record.as_object() else {
        return Vec::new();
    };

    let mut entries = match object.get("timestamp") {
        Some(Value::Object(map)) => labelled_entries(map.iter()),
        _ => labelled_entries(object.iter().filter(|(key, value)| {
            !aliases::NON_HISTORY_KEYS.contains(&key.as_str())
                && value.is_object()
                && is_timestamp_key(key)
        })),
    };
    entries.extend(array_entries(object));

    entries.sort_by_key(|entry| entry.timestamp_millis);
    entries
}

fn labelled_entries<'a>(
    pairs: impl Iterator<Item = (&'a String, &'a Value)>,
) -> Vec<HistoryEntry> {
    pairs
        .map(|(label, value)| {
            let millis = parse_time_label(label)
                .or_else(|| probe_millis(value, aliases::EVENT_TIME))
                .unwrap_or(0);
            HistoryEntry::from_event(label.clone(), Some(label.clone()), value, millis)
        })
        .collect()
}

fn array_entries(object: &Map<String, Value>) -> Vec<HistoryEntry> {
    aliases::EVENT_ARRAYS
        .iter()
        .filter_map(|field| {
            object
                .get(*field)
                .and_then(Value::as_array)
                .map(|events| (*field, events))
        })
        .flat_map(|(field, events)| {
            events
                .iter()
                .enumerate()
                .map(move |(index, event)| (field, index, event))
        })
        .map(|(field, index, event)| {
            let key = probe_non_blank(event, aliases::EVENT_ID)
                .map(display_text)
                .unwrap_or_else(|| format!("{field}[{index}]"));
            let millis = probe_millis(event, aliases::EVENT_TIME).unwrap_or(0);
            HistoryEntry::from_event(key, None, event, millis)
        })
        .collect()
}
