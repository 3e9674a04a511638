use serde_json::Value;

/// Placeholder shown wherever a field cannot be resolved.
pub const PLACEHOLDER: &str = "—";

/// Field-name alias tables. Lookups through [`probe`] are case-insensitive,
/// so each table only lists distinct spellings, in preference order.
pub mod aliases {
    pub const LOCATION: &[&str] = &["Location", "Loc", "Site", "Place"];
    pub const DIRECTION: &[&str] = &["InOutState", "InOut", "direction", "dir", "heading"];
    pub const ITEM_NAME: &[&str] = &["ItemName", "Item"];
    pub const EVENT_TIME: &[&str] = &["ts", "timestamp", "time"];
    pub const EVENT_ID: &[&str] = &["_id"];

    pub const RECORD_LOCATION: &[&str] = &["location", "lastLocation", "last_location", "site"];
    pub const RECORD_DIRECTION: &[&str] =
        &["direction", "lastDirection", "last_direction", "dir"];
    pub const RECORD_LAST_SEEN: &[&str] = &["lastSeen", "timestamp", "ts"];
    pub const RECORD_LAST_EVENT: &[&str] = &["lastEvent", "last"];

    /// Explicit overrides used by the export metadata block.
    pub const EXPLICIT_LOCATION: &[&str] = &["last_location", "lastLocation"];
    pub const EXPLICIT_DIRECTION: &[&str] = &["last_direction", "lastDirection"];

    /// Exact-case EPC candidates.
    pub const EPC: &[&str] = &["epc", "EPC", "tag", "epcId", "id", "serial", "itemname"];

    /// Array fields carrying event history.
    pub const EVENT_ARRAYS: &[&str] = &["events", "reads", "history", "scans"];

    /// Top-level keys that are never treated as timestamp labels.
    pub const NON_HISTORY_KEYS: &[&str] = &["id", "itemname", "ItemName", "epc", "EPC", "value"];

    /// Column-name preferences for the CSV history table.
    pub const CSV_LOCATION_COLUMNS: &[&str] = &["location", "loc", "site", "place"];
    pub const CSV_DIRECTION_COLUMNS: &[&str] = &["direction", "dir", "heading"];
}

/// Returns the value of the first property matching any alias,
/// case-insensitively. Aliases are tried in order, so alias preference wins
/// over property order. Non-objects never match.
pub fn probe<'a>(value: &'a Value, candidates: &[&str]) -> Option<&'a Value> {
    let object = value.as_object()?;
    candidates.iter().find_map(|candidate| {
        object
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(candidate))
            .map(|(_, found)| found)
    })
}

/// Like [`probe`] but skips blank hits and keeps looking.
pub fn probe_non_blank<'a>(value: &'a Value, candidates: &[&str]) -> Option<&'a Value> {
    candidates
        .iter()
        .find_map(|candidate| probe(value, std::slice::from_ref(candidate)).and_then(non_blank))
}

/// Epoch milliseconds from the first non-blank alias; `null` or `""` under an
/// earlier alias does not hide a later one.
pub fn probe_millis(value: &Value, candidates: &[&str]) -> Option<i64> {
    probe_non_blank(value, candidates).and_then(as_millis)
}

/// Exact-case lookup over the candidates, first non-blank hit.
pub fn field_exact<'a>(value: &'a Value, candidates: &[&str]) -> Option<&'a Value> {
    let object = value.as_object()?;
    candidates
        .iter()
        .find_map(|candidate| object.get(*candidate).and_then(non_blank))
}

/// Filters out `null` and empty strings.
pub fn non_blank(value: &Value) -> Option<&Value> {
    match value {
        Value::Null => None,
        Value::String(text) if text.is_empty() => None,
        other => Some(other),
    }
}

/// Numeric coercion for timestamp-ish fields.
pub fn as_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| {
                    trimmed
                        .parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .map(|f| f as i64)
                })
        }
        _ => None,
    }
}

/// Text rendering of a JSON value for tables and exports.
pub fn display_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        other => other.to_string(),
    }
}

/// Display text of a resolved value, or the placeholder.
pub fn text_or_placeholder(value: Option<&Value>) -> String {
    value
        .and_then(non_blank)
        .map(display_text)
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn alias_order_beats_property_order() {
        let value = json!({ "loc": "B", "Location": "A" });
        assert_eq!(probe(&value, &["Location", "loc"]), Some(&json!("A")));
        assert_eq!(probe(&value, &["LOC", "location"]), Some(&json!("B")));
    }

    #[test]
    fn probe_is_case_insensitive() {
        let value = json!({ "Location": "A", "loc": "B" });
        assert_eq!(probe(&value, &["location"]), Some(&json!("A")));
        assert_eq!(probe(&value, &["site"]), None);
    }

    #[test]
    fn explicit_null_is_present() {
        let value = json!({ "dir": null });
        assert_eq!(probe(&value, &["dir"]), Some(&Value::Null));
        assert_eq!(probe_non_blank(&value, &["dir"]), None);
    }

    #[test]
    fn non_objects_never_match() {
        for value in [json!(null), json!(3), json!("Location"), json!([{"Location": "A"}])] {
            assert_eq!(probe(&value, &["Location"]), None);
        }
    }

    #[test]
    fn coerces_numeric_strings() {
        assert_eq!(as_millis(&json!(1_700_000_000_000_i64)), Some(1_700_000_000_000));
        assert_eq!(as_millis(&json!(" 42 ")), Some(42));
        assert_eq!(as_millis(&json!(12.9)), Some(12));
        assert_eq!(as_millis(&json!("soon")), None);
        assert_eq!(as_millis(&json!({ "ts": 1 })), None);
    }

    #[test]
    fn exact_lookup_respects_case() {
        let value = json!({ "EPC": "", "tag": "T-1" });
        assert_eq!(field_exact(&value, &["epc", "EPC", "tag"]), Some(&json!("T-1")));
    }
}
