//! Local audit trail of dashboard activity, appended to a JSON-lines file.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::config::AppConfig;
use crate::errors::AppResult;
use crate::export::ExportFormat;

const LOG_FILE_NAME: &str = "telemetry-buffer.jsonl";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    AppStart {
        version: String,
    },
    SnapshotApplied {
        records: usize,
    },
    FeedFailed {
        message: String,
    },
    CsvExported {
        record_id: String,
        bytes: usize,
    },
    PdfExported {
        record_id: String,
        bytes: usize,
    },
    ExportFailed {
        record_id: String,
        format: ExportFormat,
        error: String,
    },
}

impl AuditEvent {
    pub fn exported(format: ExportFormat, record_id: String, bytes: usize) -> Self {
        match format {
            ExportFormat::Csv => AuditEvent::CsvExported { record_id, bytes },
            ExportFormat::Pdf => AuditEvent::PdfExported { record_id, bytes },
        }
    }
}

#[derive(Serialize)]
struct AuditLine<'a> {
    at: DateTime<Utc>,
    #[serde(flatten)]
    event: &'a AuditEvent,
}

/// Batches [`AuditEvent`]s and appends them once `batch_size` are pending.
/// Clones share the batch.
#[derive(Clone)]
pub struct AuditLog {
    path: PathBuf,
    batch_size: usize,
    enabled: Arc<AtomicBool>,
    pending: Arc<Mutex<Vec<(DateTime<Utc>, AuditEvent)>>>,
}

impl AuditLog {
    pub fn open<P: AsRef<Path>>(dir: P, config: &AppConfig) -> AppResult<Self> {
        fs::create_dir_all(dir.as_ref())?;
        let path = dir.as_ref().join(LOG_FILE_NAME);
        OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            batch_size: config.telemetry_batch_size.max(1),
            enabled: Arc::new(AtomicBool::new(config.telemetry_enabled_by_default)),
            pending: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn record(&self, event: AuditEvent) -> AppResult<()> {
        if !self.enabled.load(Ordering::Relaxed) {
            return Ok(());
        }
        let mut pending = self.pending.lock();
        pending.push((Utc::now(), event));
        if pending.len() >= self.batch_size {
            append(&self.path, &pending)?;
            pending.clear();
        }
        Ok(())
    }

    pub fn flush(&self) -> AppResult<()> {
        let mut pending = self.pending.lock();
        append(&self.path, &pending)?;
        pending.clear();
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }
}

/// Events stay pending if the write fails.
fn append(path: &Path, events: &[(DateTime<Utc>, AuditEvent)]) -> AppResult<()> {
    if events.is_empty() {
        return Ok(());
    }
    let mut out = Vec::new();
    for (at, event) in events {
        serde_json::to_writer(&mut out, &AuditLine { at: *at, event })?;
        out.push(b'\n');
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?
        .write_all(&out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::Value;
    use tempfile::tempdir;

    use super::*;
    use crate::config::DisplayPolicy;

    fn config(batch_size: usize) -> AppConfig {
        AppConfig {
            snapshot_file: None,
            database_path: "/".into(),
            poll_interval_ms: 1_000,
            export_dir: PathBuf::from("exports"),
            telemetry_dir: PathBuf::from("exports"),
            telemetry_enabled_by_default: true,
            telemetry_batch_size: batch_size,
            policy: DisplayPolicy::default(),
        }
    }

    fn lines(log: &AuditLog) -> Vec<Value> {
        fs::read_to_string(log.path())
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn export_events_are_named_by_format() {
        let dir = tempdir().unwrap();
        let log = AuditLog::open(dir.path(), &config(1)).unwrap();
        log.record(AuditEvent::exported(ExportFormat::Csv, "TAG1".into(), 42))
            .unwrap();

        let written = lines(&log);
        assert_eq!(written.len(), 1);
        assert_eq!(written[0]["event"], "csv_exported");
        assert_eq!(written[0]["record_id"], "TAG1");
        assert!(written[0]["at"].is_string());
        assert_eq!(log.pending(), 0);
    }

    #[test]
    fn holds_events_until_the_batch_fills() {
        let dir = tempdir().unwrap();
        let log = AuditLog::open(dir.path(), &config(3)).unwrap();
        log.record(AuditEvent::SnapshotApplied { records: 2 }).unwrap();
        log.record(AuditEvent::FeedFailed { message: "offline".into() })
            .unwrap();
        assert_eq!(log.pending(), 2);
        assert!(lines(&log).is_empty());

        log.flush().unwrap();
        let written = lines(&log);
        assert_eq!(written[0]["event"], "snapshot_applied");
        assert_eq!(written[1]["message"], "offline");
    }

    #[test]
    fn disabled_log_drops_events() {
        let dir = tempdir().unwrap();
        let log = AuditLog::open(dir.path(), &config(1)).unwrap();
        log.set_enabled(false);
        log.record(AuditEvent::PdfExported { record_id: "T".into(), bytes: 1 })
            .unwrap();
        assert_eq!(log.pending(), 0);
        assert!(lines(&log).is_empty());
    }
}
