use std::cmp::Reverse;
use std::collections::HashSet;
use std::io;

use ::csv::{QuoteStyle, Terminator, WriterBuilder};
use serde_json::{Map, Value};

use crate::accessors::summarize;
use crate::config::DisplayPolicy;
use crate::errors::AppResult;
use crate::export::record_id;
use crate::history::{normalize, HistoryEntry};
use crate::listing::DisplayRecord;
use crate::probe::{aliases, display_text, non_blank};
use crate::timestamps::format_local;

const TIMESTAMP_COLUMN: &str = "Timestamp";

/// Renders one record as CSV.
///
/// Records with history get a metadata block, a blank line and a history
/// table (most recent first); anything else is flattened into Field/Value
/// rows. Every cell is quoted.
pub fn render(
    record: &DisplayRecord,
    policy: &DisplayPolicy,
    exported_at_millis: i64,
) -> AppResult<String> {
    let history = normalize(&record.record);
    if history.is_empty() {
        let rows = std::iter::once(vec!["Field".to_string(), "Value".to_string()])
            .chain(flatten(&record.record).into_iter().map(|(k, v)| vec![k, v]));
        return write_rows(rows);
    }

    let summary = summarize(&record_id(record), &record.record, policy.epoch_threshold);
    let metadata = [
        ("Record", policy.record_label.clone()),
        ("Exported At", format_local(exported_at_millis)),
        ("EPC", summary.epc),
        ("ID", summary.id),
        ("Item Name", summary.item_name),
        ("Last Location", summary.last_location),
        ("Last Direction", summary.last_direction),
        ("Last Seen", summary.last_seen),
    ]
    .into_iter()
    .map(|(field, value)| vec![field.to_string(), value]);

    let table = HistoryTable::build(&history);
    let mut out = write_rows(metadata)?;
    out.push('\n');
    out.push_str(&write_rows(
        std::iter::once(table.columns.clone()).chain(table.cells()),
    )?);
    Ok(out)
}

struct HistoryTable {
    columns: Vec<String>,
    rows: Vec<Map<String, Value>>,
}

impl HistoryTable {
    fn build(history: &[HistoryEntry]) -> Self {
        let mut seen = KeyOrder::default();
        let mut rows: Vec<(i64, Map<String, Value>)> = history
            .iter()
            .map(|entry| {
                let mut row = Map::new();
                row.insert(TIMESTAMP_COLUMN.into(), Value::from(entry.label()));
                match &entry.raw {
                    Value::Object(fields) => {
                        for (key, value) in fields {
                            row.insert(key.clone(), value.clone());
                            seen.push(key);
                        }
                    }
                    other => {
                        row.insert("Value".into(), other.clone());
                        seen.push("Value");
                    }
                }
                if let Some(location) = entry.location.as_ref().and_then(non_blank) {
                    row.insert("Location".into(), location.clone());
                    seen.push("Location");
                }
                if let Some(direction) = entry.direction.as_ref().and_then(non_blank) {
                    row.insert("Direction".into(), direction.clone());
                    seen.push("Direction");
                }
                (entry.timestamp_millis, row)
            })
            .collect();

        // Resolved millis, not the rendered label: array events have no label.
        rows.sort_by_key(|(millis, _)| Reverse(*millis));

        Self {
            columns: seen.columns(),
            rows: rows.into_iter().map(|(_, row)| row).collect(),
        }
    }

    fn cells(&self) -> impl Iterator<Item = Vec<String>> + '_ {
        self.rows.iter().map(|row| {
            self.columns
                .iter()
                .map(|column| {
                    row.get(column)
                        .or_else(|| row.get(&column.to_lowercase()))
                        .map(display_text)
                        .unwrap_or_default()
                })
                .collect()
        })
    }
}

/// Payload keys in order of first sight.
#[derive(Default)]
struct KeyOrder {
    keys: Vec<String>,
    index: HashSet<String>,
}

impl KeyOrder {
    fn push(&mut self, key: &str) {
        if self.index.insert(key.to_string()) {
            self.keys.push(key.to_string());
        }
    }

    /// `Timestamp`, the preferred location and direction keys, then the rest.
    fn columns(&self) -> Vec<String> {
        let is_location = |key: &str| {
            aliases::CSV_LOCATION_COLUMNS.contains(&key.to_lowercase().as_str())
        };
        let is_direction = |key: &str| {
            aliases::CSV_DIRECTION_COLUMNS.contains(&key.to_lowercase().as_str())
        };

        let mut columns = vec![TIMESTAMP_COLUMN.to_string()];
        columns.extend(self.keys.iter().find(|key| is_location(key.as_str())).cloned());
        columns.extend(self.keys.iter().find(|key| is_direction(key.as_str())).cloned());
        columns.extend(
            self.keys
                .iter()
                .filter(|key| !is_location(key.as_str()) && !is_direction(key.as_str()))
                .cloned(),
        );
        columns
    }
}

/// Dot/bracket key paths for every leaf of a value.
fn flatten(value: &Value) -> Vec<(String, String)> {
    fn walk(prefix: String, value: &Value, rows: &mut Vec<(String, String)>) {
        match value {
            Value::Object(fields) => {
                for (key, child) in fields {
                    let path = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{prefix}.{key}")
                    };
                    walk(path, child, rows);
                }
            }
            Value::Array(items) => {
                for (index, child) in items.iter().enumerate() {
                    walk(format!("{prefix}[{index}]"), child, rows);
                }
            }
            Value::Null => rows.push((prefix, "null".to_string())),
            leaf => rows.push((prefix, display_text(leaf))),
        }
    }

    let mut rows = Vec::new();
    walk(String::new(), value, &mut rows);
    rows
}

fn write_rows<I>(rows: I) -> AppResult<String>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .flexible(true)
        .from_writer(Vec::new());
    for row in rows {
        writer.write_record(&row)?;
    }
    let bytes = writer.into_inner()?;
    let text =
        String::from_utf8(bytes).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    Ok(text)
}
