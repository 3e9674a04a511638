pub mod csv;
pub mod pdf;
pub mod sink;

use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;

use crate::listing::DisplayRecord;
use crate::probe::{display_text, field_exact, PLACEHOLDER};

pub use sink::{DirectorySink, ExportSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Pdf,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Pdf => "pdf",
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.extension()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportReceipt {
    pub record_id: String,
    pub format: ExportFormat,
    pub path: PathBuf,
    pub bytes: usize,
}

/// Download name for a record: item name, then id, then (CSV only) EPC.
pub fn file_name(record: &DisplayRecord, format: ExportFormat) -> String {
    let mut candidates = vec![
        field_exact(&record.record, &["itemname"]).map(display_text),
        field_exact(&record.record, &["id"])
            .map(display_text)
            .or_else(|| Some(record.id.clone())),
    ];
    if format == ExportFormat::Csv && record.epc != PLACEHOLDER {
        candidates.push(Some(record.epc.clone()));
    }
    let stem = candidates
        .into_iter()
        .flatten()
        .map(|candidate| sanitize(&candidate))
        .find(|candidate| !candidate.is_empty())
        .unwrap_or_else(|| "record".to_string());
    format!("{stem}.{}", format.extension())
}

/// The id shown in exports: the record's own `id` field, else its key.
pub(crate) fn record_id(record: &DisplayRecord) -> String {
    match record.record.get("id") {
        Some(Value::Null) | None => record.id.clone(),
        Some(value) => display_text(value),
    }
}

fn sanitize(stem: &str) -> String {
    stem.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim()
        .trim_matches('.')
        .to_string()
}
