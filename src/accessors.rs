use serde::Serialize;
use serde_json::Value;

use crate::history::{normalize, HistoryEntry};
use crate::probe::{
    aliases, as_millis, display_text, field_exact, non_blank, probe, probe_millis,
    probe_non_blank, text_or_placeholder, PLACEHOLDER,
};
use crate::timestamps::{display_label, format_local, parse_time_label};

/// The most recent event of a record, whichever shape it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct LastEvent {
    pub label: Option<String>,
    pub payload: Value,
    pub location: Option<Value>,
    pub direction: Option<Value>,
    pub name: Option<Value>,
    pub timestamp_millis: i64,
}

impl LastEvent {
    fn from_entry(entry: HistoryEntry) -> Self {
        let timestamp_millis = if entry.timestamp_millis > 0 {
            entry.timestamp_millis
        } else {
            event_millis(&entry.raw)
        };
        Self {
            label: entry.time_label,
            payload: entry.raw,
            location: entry.location,
            direction: entry.direction,
            name: entry.name,
            timestamp_millis,
        }
    }

    fn from_payload(payload: &Value) -> Self {
        Self {
            label: None,
            location: probe(payload, aliases::LOCATION).cloned(),
            direction: probe(payload, aliases::DIRECTION).cloned(),
            name: probe(payload, aliases::ITEM_NAME).cloned(),
            timestamp_millis: event_millis(payload),
            payload: payload.clone(),
        }
    }

    fn location(&self) -> Option<&Value> {
        self.location
            .as_ref()
            .and_then(non_blank)
            .or_else(|| probe_non_blank(&self.payload, aliases::LOCATION))
    }

    fn direction(&self) -> Option<&Value> {
        self.direction
            .as_ref()
            .and_then(non_blank)
            .or_else(|| probe_non_blank(&self.payload, aliases::DIRECTION))
    }
}

/// Fields shared by the CSV metadata block and the PDF summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordSummary {
    pub id: String,
    pub epc: String,
    pub item_name: String,
    pub last_location: String,
    pub last_direction: String,
    pub last_seen: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectionBadge {
    In,
    Out,
    Neutral,
}

impl DirectionBadge {
    pub fn classify(direction: &str) -> Self {
        if direction.eq_ignore_ascii_case("in") {
            DirectionBadge::In
        } else if direction.eq_ignore_ascii_case("out") {
            DirectionBadge::Out
        } else {
            DirectionBadge::Neutral
        }
    }
}

pub fn last_event(record: &Value) -> Option<LastEvent> {
    if let Some(entry) = normalize(record).pop() {
        return Some(LastEvent::from_entry(entry));
    }
    probe_non_blank(record, aliases::RECORD_LAST_EVENT).map(LastEvent::from_payload)
}

pub fn last_location(record: &Value) -> String {
    let last = last_event(record);
    let resolved = last
        .as_ref()
        .and_then(LastEvent::location)
        .or_else(|| probe_non_blank(record, aliases::RECORD_LOCATION));
    text_or_placeholder(resolved)
}

pub fn last_direction(record: &Value) -> String {
    let last = last_event(record);
    let resolved = last
        .as_ref()
        .and_then(LastEvent::direction)
        .or_else(|| probe_non_blank(record, aliases::RECORD_DIRECTION));
    text_or_placeholder(resolved)
}

/// Human-readable "last seen" for a record.
///
/// A time label on the last event wins; otherwise numeric or textual
/// timestamps from the event or the record itself are rendered, treating
/// numbers above `epoch_threshold` as epoch milliseconds.
pub fn last_seen(record: &Value, epoch_threshold: i64) -> String {
    let last = last_event(record);
    if let Some(label) = last.as_ref().and_then(|event| event.label.as_deref()) {
        return display_label(label);
    }

    let raw = last
        .as_ref()
        .and_then(|event| {
            probe_non_blank(&event.payload, aliases::EVENT_TIME)
                .cloned()
                .or_else(|| (event.timestamp_millis > 0).then(|| Value::from(event.timestamp_millis)))
        })
        .or_else(|| {
            aliases::RECORD_LAST_SEEN
                .iter()
                .filter_map(|field| record.get(*field).and_then(non_blank))
                .find(|value| !value.is_object() && !value.is_array())
                .cloned()
        });

    match raw {
        Some(value) => render_instant(&value, epoch_threshold),
        None => PLACEHOLDER.to_string(),
    }
}

pub fn epc(record: &Value) -> String {
    text_or_placeholder(field_exact(record, aliases::EPC))
}

/// `itemname`, else the name carried by the latest history entry.
pub fn item_name(record: &Value) -> String {
    if let Some(name) = field_exact(record, &["itemname"]) {
        return display_text(name);
    }
    let latest_name = normalize(record).pop().and_then(|entry| entry.name);
    text_or_placeholder(latest_name.as_ref())
}

/// Freshness timestamp: resolved epoch of the latest event, or 0.
pub fn freshness_millis(record: &Value) -> i64 {
    last_event(record)
        .map(|event| event.timestamp_millis.max(0))
        .unwrap_or(0)
}

/// Summary block used by both exporters. Explicit `last_location` /
/// `last_direction` fields on the record override derived values.
pub fn summarize(id: &str, record: &Value, epoch_threshold: i64) -> RecordSummary {
    let last_location = field_exact(record, aliases::EXPLICIT_LOCATION)
        .map(display_text)
        .unwrap_or_else(|| last_location(record));
    let last_direction = field_exact(record, aliases::EXPLICIT_DIRECTION)
        .map(display_text)
        .unwrap_or_else(|| last_direction(record));
    RecordSummary {
        id: if id.is_empty() {
            PLACEHOLDER.to_string()
        } else {
            id.to_string()
        },
        epc: epc(record),
        item_name: item_name(record),
        last_location,
        last_direction,
        last_seen: last_seen(record, epoch_threshold),
    }
}

fn event_millis(payload: &Value) -> i64 {
    probe_millis(payload, aliases::EVENT_TIME).unwrap_or(0)
}

fn render_instant(value: &Value, epoch_threshold: i64) -> String {
    if let Some(number) = as_millis(value).filter(|number| *number > epoch_threshold) {
        return format_local(number);
    }
    if let Value::String(text) = value {
        if let Some(millis) = parse_time_label(text) {
            return format_local(millis);
        }
    }
    display_text(value)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const THRESHOLD: i64 = 1_000_000_000;

    #[test]
    fn last_event_reads_timestamp_map() {
        let record = json!({
            "timestamp": {
                "2025-01-01 09:00:00": { "Location": "Gate A", "InOutState": "IN" },
                "2025-01-01 17:30:00": { "Location": "Gate A", "InOutState": "OUT" }
            }
        });
        let last = last_event(&record).unwrap();
        assert_eq!(last.label.as_deref(), Some("2025-01-01 17:30:00"));
        assert_eq!(last_location(&record), "Gate A");
        assert_eq!(last_direction(&record), "OUT");
        assert_eq!(
            last_seen(&record, THRESHOLD),
            format_local(parse_time_label("2025-01-01 17:30:00").unwrap())
        );
    }

    #[test]
    fn falls_back_to_direct_last_event() {
        let record = json!({
            "lastEvent": { "site": "Dock 4", "heading": "in", "ts": 1_700_000_000_000_i64 }
        });
        assert_eq!(last_location(&record), "Dock 4");
        assert_eq!(last_direction(&record), "in");
        assert_eq!(freshness_millis(&record), 1_700_000_000_000);
        assert_eq!(last_seen(&record, THRESHOLD), format_local(1_700_000_000_000));
    }

    #[test]
    fn event_ids_never_stand_in_for_last_seen() {
        let record = json!({ "events": [
            { "_id": "read-1", "ts": 1_700_000_000_000_i64, "location": "Dock" }
        ]});
        assert_eq!(last_event(&record).unwrap().label, None);
        assert_eq!(last_seen(&record, THRESHOLD), format_local(1_700_000_000_000));
        assert_eq!(last_location(&record), "Dock");
    }

    #[test]
    fn null_time_alias_does_not_hide_a_valid_one() {
        let record = json!({ "events": [{ "ts": null, "time": 1_700_000_000_000_i64 }] });
        assert_eq!(freshness_millis(&record), 1_700_000_000_000);

        let direct = json!({ "lastEvent": { "ts": "", "timestamp": 1_700_000_000_000_i64 } });
        assert_eq!(freshness_millis(&direct), 1_700_000_000_000);
    }

    #[test]
    fn last_event_field_matches_any_case() {
        let record = json!({ "LastEvent": { "loc": "Bay 2", "ts": 1_700_000_000_000_i64 } });
        assert_eq!(last_location(&record), "Bay 2");
        assert_eq!(freshness_millis(&record), 1_700_000_000_000);
    }

    #[test]
    fn falls_back_to_record_fields() {
        let record = json!({ "lastLocation": "Lobby", "dir": "OUT", "lastSeen": "yesterday" });
        assert_eq!(last_location(&record), "Lobby");
        assert_eq!(last_direction(&record), "OUT");
        assert_eq!(last_seen(&record, THRESHOLD), "yesterday");
    }

    #[test]
    fn small_numbers_are_not_epochs() {
        let record = json!({ "ts": 12345 });
        assert_eq!(last_seen(&record, THRESHOLD), "12345");
        assert_eq!(last_seen(&json!({}), THRESHOLD), PLACEHOLDER);
    }

    #[test]
    fn epc_prefers_explicit_fields() {
        assert_eq!(epc(&json!({ "id": "k", "EPC": "E2" })), "E2");
        assert_eq!(epc(&json!({ "epc": "", "serial": "S9" })), "S9");
        assert_eq!(epc(&json!({ "note": "hi" })), PLACEHOLDER);
    }

    #[test]
    fn item_name_uses_latest_history_name() {
        let record = json!({ "events": [
            { "ItemName": "old", "ts": 1 },
            { "ItemName": "new", "ts": 2 }
        ]});
        assert_eq!(item_name(&record), "new");
        assert_eq!(item_name(&json!({ "itemname": "Badge07" })), "Badge07");
        assert_eq!(item_name(&json!({})), PLACEHOLDER);
    }

    #[test]
    fn summary_prefers_explicit_overrides() {
        let record = json!({
            "lastLocation": "Override",
            "events": [{ "location": "Derived", "direction": "IN", "ts": 5 }]
        });
        let summary = summarize("tag-1", &record, THRESHOLD);
        assert_eq!(summary.last_location, "Override");
        assert_eq!(summary.last_direction, "IN");
        assert_eq!(summary.id, "tag-1");
    }

    #[test]
    fn classifies_direction_badges() {
        assert_eq!(DirectionBadge::classify("In"), DirectionBadge::In);
        assert_eq!(DirectionBadge::classify("OUT"), DirectionBadge::Out);
        assert_eq!(DirectionBadge::classify(PLACEHOLDER), DirectionBadge::Neutral);
    }
}
