use std::path::PathBuf;
use std::{env, io};

use serde::Serialize;
use tracing::debug;

const DEFAULT_DATABASE_PATH: &str = "/";
const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_FRESHNESS_WINDOW_SECS: u64 = 120;
const DEFAULT_EPOCH_THRESHOLD: i64 = 1_000_000_000;
const DEFAULT_RECORD_LABEL: &str = "Acetra EPC Record";

#[derive(Clone, Debug, Serialize)]
pub struct AppConfig {
    pub snapshot_file: Option<PathBuf>,
    pub database_path: String,
    pub poll_interval_ms: u64,
    pub export_dir: PathBuf,
    pub telemetry_dir: PathBuf,
    pub telemetry_enabled_by_default: bool,
    pub telemetry_batch_size: usize,
    pub policy: DisplayPolicy,
}

/// Thresholds used when deriving display fields. Both are product decisions
/// without a documented rationale, so they stay configurable.
#[derive(Clone, Debug, Serialize)]
pub struct DisplayPolicy {
    pub freshness_window_ms: i64,
    pub epoch_threshold: i64,
    pub record_label: String,
}

impl Default for DisplayPolicy {
    fn default() -> Self {
        Self {
            freshness_window_ms: (DEFAULT_FRESHNESS_WINDOW_SECS * 1_000) as i64,
            epoch_threshold: DEFAULT_EPOCH_THRESHOLD,
            record_label: DEFAULT_RECORD_LABEL.to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        let export_dir = env::var("EXPORT_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("exports"));
        Self {
            snapshot_file: env::var("SNAPSHOT_FILE")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            database_path: env::var("DATABASE_PATH")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string()),
            poll_interval_ms: parse_u64("POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS).max(50),
            telemetry_dir: env::var("TELEMETRY_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| export_dir.clone()),
            export_dir,
            telemetry_enabled_by_default: parse_bool("TELEMETRY_ENABLED", true),
            telemetry_batch_size: parse_usize("TELEMETRY_BATCH_SIZE", 25).max(1),
            policy: DisplayPolicy {
                freshness_window_ms: (parse_u64(
                    "FRESHNESS_WINDOW_SECS",
                    DEFAULT_FRESHNESS_WINDOW_SECS,
                ) as i64)
                    .saturating_mul(1_000),
                epoch_threshold: parse_i64("EPOCH_THRESHOLD", DEFAULT_EPOCH_THRESHOLD),
                record_label: env::var("RECORD_LABEL")
                    .ok()
                    .filter(|v| !v.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_RECORD_LABEL.to_string()),
            },
        }
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_i64(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(default)
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}
