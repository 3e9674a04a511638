pub mod accessors;
pub mod commands;
pub mod config;
pub mod dashboard;
pub mod errors;
pub mod export;
pub mod feed;
pub mod history;
pub mod listing;
pub mod probe;
pub mod telemetry;
pub mod timestamps;
pub mod view;

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use crate::config::{AppConfig, DisplayPolicy};
pub use crate::dashboard::{Dashboard, DashboardRow, DashboardView, FeedStatus};
pub use crate::errors::{AppError, AppResult};
pub use crate::export::{DirectorySink, ExportFormat, ExportReceipt, ExportSink};
pub use crate::feed::{FileFeed, MemoryFeed, SnapshotFeed, Subscription};
pub use crate::history::{normalize, HistoryEntry};
pub use crate::listing::{assemble, DisplayRecord, RecordList};
pub use crate::telemetry::{AuditEvent, AuditLog};
pub use crate::timestamps::is_timestamp_key;

/// Builds a dashboard from configuration: the audit log under the telemetry
/// directory, exports into the export directory.
pub fn bootstrap(config: AppConfig) -> AppResult<Dashboard> {
    init_tracing();
    let audit = AuditLog::open(&config.telemetry_dir, &config)?;
    if let Err(err) = audit.record(AuditEvent::AppStart {
        version: env!("CARGO_PKG_VERSION").to_string(),
    }) {
        warn!(?err, "failed to record audit bootstrap event");
    }
    let sink = Arc::new(DirectorySink::new(&config.export_dir));
    Ok(Dashboard::new(config, audit, sink))
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,epc_tracker_lib=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    });
}
