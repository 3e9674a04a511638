use serde::Serialize;
use serde_json::{Map, Value};

use crate::accessors::{self, DirectionBadge};
use crate::config::DisplayPolicy;
use crate::probe::{as_millis, non_blank};
use crate::timestamps::{format_local, parse_time_label};

/// A record enriched with the columns the table shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayRecord {
    pub id: String,
    pub record: Value,
    pub epc: String,
    pub item_name: String,
    pub last_location: String,
    pub last_direction: String,
    pub last_seen: String,
    pub freshness_millis: i64,
}

impl DisplayRecord {
    fn build(id: String, record: Value, policy: &DisplayPolicy) -> Self {
        Self {
            epc: accessors::epc(&record),
            item_name: accessors::item_name(&record),
            last_location: accessors::last_location(&record),
            last_direction: accessors::last_direction(&record),
            last_seen: accessors::last_seen(&record, policy.epoch_threshold),
            freshness_millis: accessors::freshness_millis(&record),
            id,
            record,
        }
    }

    /// Seen within the freshness window ending at `now_millis`.
    pub fn is_new(&self, now_millis: i64, freshness_window_ms: i64) -> bool {
        self.freshness_millis > 0 && now_millis - self.freshness_millis < freshness_window_ms
    }

    pub fn direction_badge(&self) -> DirectionBadge {
        DirectionBadge::classify(&self.last_direction)
    }

    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim();
        query.is_empty() || self.epc.to_lowercase().contains(&query.to_lowercase())
    }
}

/// The rebuilt table for one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordList {
    pub records: Vec<DisplayRecord>,
    pub last_update: Option<String>,
}

impl RecordList {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn find(&self, id: &str) -> Option<&DisplayRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    pub fn filtered<'a>(&'a self, query: &'a str) -> impl Iterator<Item = &'a DisplayRecord> + 'a {
        self.records.iter().filter(move |record| record.matches(query))
    }
}

/// Turns a whole snapshot into display records, most recently updated first.
pub fn assemble(snapshot: &Value, now_millis: i64, policy: &DisplayPolicy) -> RecordList {
    let mut records: Vec<DisplayRecord> = split_records(snapshot)
        .into_iter()
        .map(|(id, record)| DisplayRecord::build(id, record, policy))
        .collect();

    records.sort_by_key(|record| std::cmp::Reverse(sort_key(&record.record)));

    let last_update = if records.is_empty() {
        None
    } else {
        let newest = records
            .iter()
            .map(|record| record.freshness_millis)
            .max()
            .unwrap_or(0);
        Some(format_local(if newest > 0 { newest } else { now_millis }))
    };

    RecordList {
        records,
        last_update,
    }
}

fn split_records(snapshot: &Value) -> Vec<(String, Value)> {
    match snapshot {
        Value::Null => Vec::new(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let id = index.to_string();
                let record = with_id(&id, item);
                (id, record)
            })
            .collect(),
        Value::Object(children) => children
            .iter()
            .map(|(key, child)| (key.clone(), with_id(key, child)))
            .collect(),
        scalar => {
            let mut record = Map::new();
            record.insert("id".into(), Value::from("value"));
            record.insert("value".into(), scalar.clone());
            vec![("value".to_string(), Value::Object(record))]
        }
    }
}

/// `{id}` overlaid with the child's own fields; a child `id` wins.
fn with_id(id: &str, child: &Value) -> Value {
    let mut record = Map::new();
    record.insert("id".into(), Value::from(id));
    match child {
        Value::Object(fields) => {
            for (key, value) in fields {
                record.insert(key.clone(), value.clone());
            }
        }
        Value::Null => {}
        other => {
            record.insert("value".into(), other.clone());
        }
    }
    Value::Object(record)
}

fn sort_key(record: &Value) -> i64 {
    let last_event = record.get("lastEvent");
    [
        record.get("lastSeen"),
        last_event.and_then(|event| event.get("ts")),
        last_event.and_then(|event| event.get("timestamp")),
        record.get("ts"),
        record.get("timestamp"),
    ]
    .into_iter()
    .flatten()
    .find_map(non_blank)
    .and_then(|value| {
        as_millis(value).or_else(|| value.as_str().and_then(parse_time_label))
    })
    .unwrap_or(0)
}
