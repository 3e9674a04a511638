use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::accessors::DirectionBadge;
use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::export::{self, ExportFormat, ExportReceipt, ExportSink};
use crate::feed::{SnapshotFeed, SnapshotListener, SnapshotResult, Subscription};
use crate::listing::{assemble, DisplayRecord, RecordList};
use crate::telemetry::{AuditEvent, AuditLog};

/// Where the table stands relative to the feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FeedStatus {
    Loading,
    Ready,
    Failed { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardRow {
    #[serde(flatten)]
    pub record: DisplayRecord,
    pub is_new: bool,
    pub badge: DirectionBadge,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub status: FeedStatus,
    pub tag_count: usize,
    pub last_update: Option<String>,
    pub rows: Vec<DashboardRow>,
}

struct DashboardState {
    status: FeedStatus,
    list: RecordList,
}

/// Holds the current table and performs exports against it. Cheap to clone;
/// clones share state.
#[derive(Clone)]
pub struct Dashboard {
    state: Arc<Mutex<DashboardState>>,
    config: Arc<AppConfig>,
    audit: AuditLog,
    sink: Arc<dyn ExportSink>,
}

impl Dashboard {
    pub fn new(config: AppConfig, audit: AuditLog, sink: Arc<dyn ExportSink>) -> Self {
        Self {
            state: Arc::new(Mutex::new(DashboardState {
                status: FeedStatus::Loading,
                list: RecordList::default(),
            })),
            config: Arc::new(config),
            audit,
            sink,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn status(&self) -> FeedStatus {
        self.state.lock().status.clone()
    }

    /// Replaces the whole table with one built from `snapshot`.
    pub fn apply_snapshot(&self, snapshot: &Value, now_millis: i64) {
        let list = assemble(snapshot, now_millis, &self.config.policy);
        let count = list.len();
        {
            let mut state = self.state.lock();
            state.list = list;
            state.status = FeedStatus::Ready;
        }
        debug!(target: "dashboard", records = count, "snapshot applied");
        self.record_event(AuditEvent::SnapshotApplied { records: count });
    }

    /// Clears the table and shows `message` instead.
    pub fn apply_feed_error(&self, message: &str) {
        {
            let mut state = self.state.lock();
            state.list = RecordList::default();
            state.status = FeedStatus::Failed {
                message: message.to_string(),
            };
        }
        warn!(target: "dashboard", error = message, "snapshot feed failed");
        self.record_event(AuditEvent::FeedFailed {
            message: message.to_string(),
        });
    }

    /// Callback suitable for [`SnapshotFeed::subscribe`].
    pub fn listener(&self) -> SnapshotListener {
        let dashboard = self.clone();
        Arc::new(move |result: SnapshotResult| match result {
            Ok(snapshot) => dashboard.apply_snapshot(&snapshot, crate::now_millis()),
            Err(message) => dashboard.apply_feed_error(&message),
        })
    }

    /// Subscribes to the configured database path.
    pub async fn attach(&self, feed: &dyn SnapshotFeed) -> AppResult<Subscription> {
        let path = self.config.database_path.clone();
        info!(target: "dashboard", path = %path, "subscribing to snapshots");
        feed.subscribe(&path, self.listener()).await
    }

    pub fn view(&self, query: &str, now_millis: i64) -> DashboardView {
        let window = self.config.policy.freshness_window_ms;
        let state = self.state.lock();
        DashboardView {
            status: state.status.clone(),
            tag_count: state.list.len(),
            last_update: state.list.last_update.clone(),
            rows: state
                .list
                .filtered(query)
                .map(|record| DashboardRow {
                    is_new: record.is_new(now_millis, window),
                    badge: record.direction_badge(),
                    record: record.clone(),
                })
                .collect(),
        }
    }

    /// A copy of the record as it is now; later snapshots do not affect it.
    pub fn record(&self, id: &str) -> AppResult<DisplayRecord> {
        self.state
            .lock()
            .list
            .find(id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(id.to_string()))
    }

    pub fn export_csv(&self, id: &str, now_millis: i64) -> AppResult<ExportReceipt> {
        self.export(id, ExportFormat::Csv, |record| {
            export::csv::render(record, &self.config.policy, now_millis).map(String::into_bytes)
        })
    }

    pub fn export_pdf(&self, id: &str) -> AppResult<ExportReceipt> {
        self.export(id, ExportFormat::Pdf, |record| {
            export::pdf::render(record, &self.config.policy)
        })
    }

    fn export<F>(&self, id: &str, format: ExportFormat, render: F) -> AppResult<ExportReceipt>
    where
        F: FnOnce(&DisplayRecord) -> AppResult<Vec<u8>>,
    {
        let result = self.record(id).and_then(|record| {
            let bytes = render(&record)?;
            let path = self.sink.save(&export::file_name(&record, format), &bytes)?;
            Ok(ExportReceipt {
                record_id: record.id,
                format,
                path,
                bytes: bytes.len(),
            })
        });

        match &result {
            Ok(receipt) => {
                info!(
                    target: "export",
                    record = %receipt.record_id,
                    path = %receipt.path.display(),
                    "{} export saved",
                    format.as_str()
                );
                self.record_event(AuditEvent::exported(
                    format,
                    receipt.record_id.clone(),
                    receipt.bytes,
                ));
            }
            Err(err) => {
                warn!(target: "export", record = id, error = %err, "{} export failed", format.as_str());
                self.record_event(AuditEvent::ExportFailed {
                    record_id: id.to_string(),
                    format,
                    error: err.to_string(),
                });
            }
        }
        result
    }

    pub fn flush_audit(&self) {
        if let Err(err) = self.audit.flush() {
            warn!(?err, "failed to flush audit log");
        }
    }

    fn record_event(&self, event: AuditEvent) {
        if let Err(err) = self.audit.record(event) {
            warn!(?err, "failed to record audit event");
        }
    }
}
