//! Snapshot subscriptions. A feed delivers the whole value at a database
//! path right away and again after every change; there are no incremental
//! updates.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::errors::AppResult;

pub type SnapshotResult = Result<Value, String>;
pub type SnapshotListener = Arc<dyn Fn(SnapshotResult) + Send + Sync>;

#[async_trait]
pub trait SnapshotFeed: Send + Sync {
    async fn subscribe(&self, path: &str, listener: SnapshotListener) -> AppResult<Subscription>;
}

/// Handle returned by [`SnapshotFeed::subscribe`]; delivery stops when it is
/// dropped or unsubscribed.
pub struct Subscription {
    cancelled: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    fn new(cancelled: Arc<AtomicBool>, task: Option<JoinHandle<()>>) -> Self {
        Self { cancelled, task }
    }

    pub fn is_active(&self) -> bool {
        !self.cancelled.load(Ordering::SeqCst)
    }

    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Maps a database-style path (`/`, `/tags`, `tags/TAG1/`) to a JSON pointer.
pub fn json_pointer(path: &str) -> String {
    let segments: Vec<&str> = path
        .split('/')
        .filter(|segment| !segment.trim().is_empty())
        .collect();
    if segments.is_empty() {
        return String::new();
    }
    segments
        .iter()
        .map(|segment| format!("/{}", segment.replace('~', "~0")))
        .collect()
}

fn select(document: &Value, pointer: &str) -> Value {
    document.pointer(pointer).cloned().unwrap_or(Value::Null)
}

/// Polls a JSON document on disk and delivers the subscribed path whenever
/// the file contents change.
#[derive(Debug, Clone)]
pub struct FileFeed {
    file: PathBuf,
    interval: Duration,
}

impl FileFeed {
    pub fn new<P: AsRef<Path>>(file: P, interval: Duration) -> Self {
        Self {
            file: file.as_ref().to_path_buf(),
            interval,
        }
    }

    /// Reads the document once.
    pub fn read(&self, path: &str) -> SnapshotResult {
        read_document(&self.file).map(|document| select(&document, &json_pointer(path)))
    }
}

fn read_contents(file: &Path) -> Result<String, String> {
    fs::read_to_string(file).map_err(|err| format!("{}: {err}", file.display()))
}

fn parse_contents(contents: &str) -> Result<Value, String> {
    if contents.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(contents).map_err(|err| format!("invalid snapshot JSON: {err}"))
}

fn read_document(file: &Path) -> Result<Value, String> {
    read_contents(file).and_then(|contents| parse_contents(&contents))
}

#[async_trait]
impl SnapshotFeed for FileFeed {
    async fn subscribe(&self, path: &str, listener: SnapshotListener) -> AppResult<Subscription> {
        let pointer = json_pointer(path);
        let file = self.file.clone();
        let cancelled = Arc::new(AtomicBool::new(false));

        let mut last = read_contents(&file);
        listener(
            last.clone()
                .and_then(|contents| parse_contents(&contents))
                .map(|document| select(&document, &pointer)),
        );

        let flag = Arc::clone(&cancelled);
        let period = self.interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if flag.load(Ordering::SeqCst) {
                    break;
                }
                let current = read_contents(&file);
                if current == last {
                    continue;
                }
                match &current {
                    Ok(_) => debug!(target: "feed", path = %file.display(), "snapshot changed"),
                    Err(err) => warn!(target: "feed", error = %err, "snapshot read failed"),
                }
                listener(
                    current
                        .clone()
                        .and_then(|contents| parse_contents(&contents))
                        .map(|document| select(&document, &pointer)),
                );
                last = current;
            }
        });

        Ok(Subscription::new(cancelled, Some(task)))
    }
}

struct MemoryListener {
    pointer: String,
    cancelled: Arc<AtomicBool>,
    listener: SnapshotListener,
}

#[derive(Default)]
struct MemoryState {
    document: Value,
    listeners: Vec<MemoryListener>,
}

/// In-process feed: hosts push whole documents with [`MemoryFeed::publish`].
#[derive(Clone, Default)]
pub struct MemoryFeed {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryFeed {
    pub fn new(document: Value) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                document,
                listeners: Vec::new(),
            })),
        }
    }

    pub fn publish(&self, document: Value) {
        let targets = {
            let mut state = self.state.lock();
            state.document = document;
            state.prune();
            state
                .listeners
                .iter()
                .map(|entry| {
                    (
                        Arc::clone(&entry.listener),
                        select(&state.document, &entry.pointer),
                    )
                })
                .collect::<Vec<_>>()
        };
        for (listener, value) in targets {
            listener(Ok(value));
        }
    }

    pub fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        let targets = {
            let mut state = self.state.lock();
            state.prune();
            state
                .listeners
                .iter()
                .map(|entry| Arc::clone(&entry.listener))
                .collect::<Vec<_>>()
        };
        for listener in targets {
            listener(Err(message.clone()));
        }
    }

    pub fn listener_count(&self) -> usize {
        let mut state = self.state.lock();
        state.prune();
        state.listeners.len()
    }
}

impl MemoryState {
    fn prune(&mut self) {
        self.listeners
            .retain(|entry| !entry.cancelled.load(Ordering::SeqCst));
    }
}

#[async_trait]
impl SnapshotFeed for MemoryFeed {
    async fn subscribe(&self, path: &str, listener: SnapshotListener) -> AppResult<Subscription> {
        let pointer = json_pointer(path);
        let cancelled = Arc::new(AtomicBool::new(false));
        let initial = {
            let mut state = self.state.lock();
            let initial = select(&state.document, &pointer);
            state.listeners.push(MemoryListener {
                pointer,
                cancelled: Arc::clone(&cancelled),
                listener: Arc::clone(&listener),
            });
            initial
        };
        listener(Ok(initial));
        Ok(Subscription::new(cancelled, None))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    fn collector() -> (SnapshotListener, Arc<Mutex<Vec<SnapshotResult>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener: SnapshotListener = Arc::new(move |value| sink.lock().push(value));
        (listener, seen)
    }

    #[test]
    fn maps_database_paths_to_pointers() {
        assert_eq!(json_pointer("/"), "");
        assert_eq!(json_pointer(""), "");
        assert_eq!(json_pointer("tags/TAG1/"), "/tags/TAG1");
        assert_eq!(json_pointer("/a~b"), "/a~0b");
    }

    #[tokio::test]
    async fn memory_feed_delivers_immediately_and_on_publish() {
        let feed = MemoryFeed::new(json!({ "tags": { "T1": { "epc": "E1" } } }));
        let (listener, seen) = collector();
        let subscription = feed.subscribe("/tags", listener).await.unwrap();

        feed.publish(json!({ "tags": null }));
        feed.fail("permission denied");

        let seen = seen.lock().clone();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], Ok(json!({ "T1": { "epc": "E1" } })));
        assert_eq!(seen[1], Ok(Value::Null));
        assert_eq!(seen[2], Err("permission denied".to_string()));

        subscription.unsubscribe();
        assert_eq!(feed.listener_count(), 0);
    }

    #[tokio::test]
    async fn file_feed_redelivers_after_change() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("snapshot.json");
        std::fs::write(&file, r#"{"T1":{"epc":"E1"}}"#).unwrap();

        let feed = FileFeed::new(&file, Duration::from_millis(20));
        let (listener, seen) = collector();
        let subscription = feed.subscribe("/", listener).await.unwrap();
        assert_eq!(seen.lock().len(), 1);

        std::fs::write(&file, r#"{"T1":{"epc":"E1"},"T2":{"epc":"E2"}}"#).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        {
            let seen = seen.lock();
            assert_eq!(seen.len(), 2);
            assert_eq!(seen[1].as_ref().unwrap()["T2"]["epc"], json!("E2"));
        }

        drop(subscription);
        std::fs::write(&file, "{}").unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn file_feed_reports_missing_files() {
        let dir = tempdir().unwrap();
        let feed = FileFeed::new(dir.path().join("absent.json"), Duration::from_secs(60));
        let (listener, seen) = collector();
        let _subscription = feed.subscribe("/", listener).await.unwrap();
        assert!(seen.lock()[0].is_err());
    }
}
