use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};

use epc_tracker_lib::commands::{dashboard_view, download_csv, download_pdf, record_history};
use epc_tracker_lib::timestamps::{format_local, parse_time_label};
use epc_tracker_lib::view::ExpansionState;
use epc_tracker_lib::{
    normalize, AppConfig, Dashboard, DirectorySink, DisplayPolicy, FeedStatus, MemoryFeed,
    SnapshotFeed, AuditLog,
};

fn config(dir: &TempDir) -> AppConfig {
    AppConfig {
        snapshot_file: None,
        database_path: "/tags".into(),
        poll_interval_ms: 1_000,
        export_dir: dir.path().join("exports"),
        telemetry_dir: dir.path().join("telemetry"),
        telemetry_enabled_by_default: true,
        telemetry_batch_size: 1,
        policy: DisplayPolicy::default(),
    }
}

fn dashboard(dir: &TempDir) -> Dashboard {
    let config = config(dir);
    let audit = AuditLog::open(&config.telemetry_dir, &config).unwrap();
    let sink = Arc::new(DirectorySink::new(&config.export_dir));
    Dashboard::new(config, audit, sink)
}

fn tags() -> Value {
    json!({
        "TAG1": {
            "itemname": "Badge07",
            "timestamp": {
                "2025-01-01 09:00:00": { "Location": "Gate A", "InOutState": "IN" },
                "2025-01-01 17:30:00": { "Location": "Gate A", "InOutState": "OUT" }
            }
        },
        "TAG2": {
            "epc": "E200-0002",
            "2025-02-01_08-00-00": { "location": "Dock", "direction": "IN" }
        },
        "TAG3": { "id": "x", "note": "hi" }
    })
}

#[tokio::test]
async fn snapshot_to_table_to_exports() {
    let dir = tempdir().unwrap();
    let board = dashboard(&dir);
    let feed = MemoryFeed::new(json!({ "tags": tags() }));
    let subscription = feed.subscribe("/tags", board.listener()).await.unwrap();

    let view = dashboard_view(&board, None).unwrap();
    assert_eq!(view.status, FeedStatus::Ready);
    assert_eq!(view.tag_count, 3);

    let tag1 = board.record("TAG1").unwrap();
    assert_eq!(tag1.item_name, "Badge07");
    assert_eq!(tag1.last_location, "Gate A");
    assert_eq!(tag1.last_direction, "OUT");
    let evening = parse_time_label("2025-01-01 17:30:00").unwrap();
    assert_eq!(tag1.last_seen, format_local(evening));
    let history = normalize(&tag1.record);
    assert_eq!(history.len(), 2);
    assert!(history[0].timestamp_millis < history[1].timestamp_millis);

    let tag2 = board.record("TAG2").unwrap();
    let history = normalize(&tag2.record);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].key, "2025-02-01_08-00-00");
    assert_eq!(tag2.last_location, "Dock");
    assert_eq!(tag2.last_direction, "IN");
    assert_eq!(tag2.epc, "E200-0002");

    // No record carries a top-level lastSeen, so discovery order holds.
    let order: Vec<_> = view.rows.iter().map(|row| row.record.id.as_str()).collect();
    assert_eq!(order, vec!["TAG1", "TAG2", "TAG3"]);

    let csv = download_csv(&board, "TAG1").unwrap();
    assert!(csv.path.ends_with("exports/Badge07.csv"));
    let text = std::fs::read_to_string(&csv.path).unwrap();
    let (metadata, table) = text.split_once("\n\n").unwrap();
    assert!(metadata.contains("\"Last Direction\",\"OUT\""));
    let rows: Vec<_> = table.lines().collect();
    assert_eq!(rows.len(), 3);
    assert!(rows[1].starts_with("\"2025-01-01 17:30:00\""));
    assert!(rows[2].starts_with("\"2025-01-01 09:00:00\""));

    let fallback = download_csv(&board, "TAG3").unwrap();
    assert!(fallback.path.ends_with("exports/x.csv"));
    let text = std::fs::read_to_string(&fallback.path).unwrap();
    assert_eq!(text.lines().count(), 3);
    assert!(text.starts_with("\"Field\",\"Value\"\n"));

    let pdf = download_pdf(&board, "TAG2").unwrap();
    assert!(pdf.path.ends_with("exports/TAG2.pdf"));
    assert!(std::fs::read(&pdf.path).unwrap().starts_with(b"%PDF"));

    subscription.unsubscribe();
}

#[tokio::test]
async fn feed_failure_clears_table_and_blocks_exports() {
    let dir = tempdir().unwrap();
    let board = dashboard(&dir);
    let feed = MemoryFeed::new(json!({ "tags": tags() }));
    let _subscription = feed.subscribe("/tags", board.listener()).await.unwrap();

    feed.fail("permission denied");
    let view = dashboard_view(&board, None).unwrap();
    assert_eq!(
        view.status,
        FeedStatus::Failed {
            message: "permission denied".into()
        }
    );
    assert_eq!(view.tag_count, 0);
    let err = download_pdf(&board, "TAG1").unwrap_err();
    assert!(err.contains("TAG1"));

    feed.publish(json!({ "tags": null }));
    let view = dashboard_view(&board, None).unwrap();
    assert_eq!(view.status, FeedStatus::Ready);
    assert!(view.rows.is_empty());
    assert!(view.last_update.is_none());
}

#[test]
fn expanded_history_follows_snapshots() {
    let dir = tempdir().unwrap();
    let board = dashboard(&dir);
    board.apply_snapshot(&tags(), 0);

    let mut expansion = ExpansionState::default();
    expansion.toggle_row("TAG1");
    expansion.toggle_entry("TAG1", "2025-01-01 17:30:00");
    let lines = record_history(&board, "TAG1", &expansion).unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1].direction, "OUT");
    assert!(lines[1].open);
    assert_eq!(lines[1].raw["InOutState"], json!("OUT"));

    board.apply_snapshot(&json!({ "TAG2": tags()["TAG2"].clone() }), 0);
    let live: Vec<String> = board
        .view("", 0)
        .rows
        .into_iter()
        .map(|row| row.record.id)
        .collect();
    expansion.retain_rows(live.iter().map(String::as_str));
    assert!(!expansion.is_row_open("TAG1"));
    assert!(record_history(&board, "TAG1", &expansion).is_err());
}

#[test]
fn freshness_window_marks_recent_tags() {
    let dir = tempdir().unwrap();
    let board = dashboard(&dir);
    let now = 1_735_000_000_000i64;
    board.apply_snapshot(
        &json!({
            "recent": { "lastEvent": { "ts": now - 90_000 } },
            "stale": { "lastEvent": { "ts": now - 180_000 } }
        }),
        now,
    );

    let view = board.view("", now);
    let recent = view.rows.iter().find(|row| row.record.id == "recent").unwrap();
    let stale = view.rows.iter().find(|row| row.record.id == "stale").unwrap();
    assert!(recent.is_new);
    assert!(!stale.is_new);
}
