//! Shared fixtures for scorecard-sync integration tests
//!
//! - [`MemorySource`]: an in-memory [`PageSource`] with scripted failures
//! - [`RecordingSleeper`]: records delays instead of sleeping
//! - [`Workspace`]: a temp directory holding the snapshot and checkpoint

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use scorecard_sync::client::{PageResult, PageSource};
use scorecard_sync::engine::{EngineOptions, SyncEngine};
use scorecard_sync::paginator::PaginatorConfig;
use scorecard_sync::retry::{FetchError, Sleeper};
use scorecard_sync::store::{CheckpointStore, SnapshotStore};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Raw record in the flat dotted-key shape the API returns
pub fn school(id: u64, name: &str) -> Value {
    json!({
        "id": id,
        "school.name": name,
        "school.state": "CA",
        "latest.student.size": id * 10,
    })
}

#[derive(Default)]
struct SourceState {
    pages: Vec<Vec<Value>>,
    total: Option<u64>,
    fail_at: Option<u32>,
    cancel_after: Option<(u32, CancellationToken)>,
    requested: Vec<u32>,
}

/// Serves fixed pages; cloning shares the underlying state
#[derive(Clone, Default)]
pub struct MemorySource {
    state: Arc<Mutex<SourceState>>,
}

impl MemorySource {
    pub fn new(pages: Vec<Vec<Value>>) -> Self {
        let source = Self::default();
        source.state.lock().unwrap().pages = pages;
        source
    }

    pub fn with_total(self, total: u64) -> Self {
        self.state.lock().unwrap().total = Some(total);
        self
    }

    /// Reject `page` with a permanent error until [`MemorySource::heal`]
    pub fn fail_at(&self, page: u32) {
        self.state.lock().unwrap().fail_at = Some(page);
    }

    pub fn heal(&self) {
        self.state.lock().unwrap().fail_at = None;
    }

    /// Cancel `token` once `page` has been served
    pub fn cancel_after(&self, page: u32, token: CancellationToken) {
        self.state.lock().unwrap().cancel_after = Some((page, token));
    }

    pub fn set_page(&self, page: u32, records: Vec<Value>) {
        self.state.lock().unwrap().pages[page as usize - 1] = records;
    }

    pub fn requested(&self) -> Vec<u32> {
        self.state.lock().unwrap().requested.clone()
    }

    pub fn reset_requests(&self) {
        self.state.lock().unwrap().requested.clear();
    }
}

#[async_trait]
impl PageSource for MemorySource {
    async fn fetch_page(&self, page: u32, _page_size: u32) -> Result<PageResult, FetchError> {
        let mut state = self.state.lock().unwrap();
        state.requested.push(page);

        if state.fail_at == Some(page) {
            return Err(FetchError::Status {
                status: 403,
                message: "API_KEY_INVALID".to_string(),
            });
        }

        if let Some((after, token)) = &state.cancel_after {
            if *after == page {
                token.cancel();
            }
        }

        Ok(PageResult {
            records: state
                .pages
                .get(page as usize - 1)
                .cloned()
                .unwrap_or_default(),
            total: state.total,
        })
    }
}

#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

/// Snapshot and checkpoint paths inside a temp directory
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.path().join("data/filtered_data.json")
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.dir.path().join("data/.sync-checkpoint.json")
    }

    pub fn snapshots(&self) -> SnapshotStore {
        SnapshotStore::new(self.snapshot_path())
    }

    pub fn checkpoints(&self) -> CheckpointStore {
        CheckpointStore::new(self.checkpoint_path())
    }

    pub fn snapshot_text(&self) -> String {
        std::fs::read_to_string(self.snapshot_path()).unwrap()
    }

    pub fn write_snapshot(&self, json: &Value) {
        let path = self.snapshot_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, serde_json::to_string_pretty(json).unwrap()).unwrap();
    }

    /// Engine over `source` with no pacing delay and no real sleeps
    pub fn engine<S: PageSource>(
        &self,
        source: S,
        page_size: u32,
        flush_every: u32,
    ) -> SyncEngine<S> {
        self.engine_with(source, options(page_size, flush_every, 100, None))
    }

    pub fn engine_with<S: PageSource>(&self, source: S, options: EngineOptions) -> SyncEngine<S> {
        SyncEngine::new(source, self.snapshots(), self.checkpoints(), options)
            .with_sleeper(Arc::new(RecordingSleeper::default()))
    }
}

pub fn options(
    page_size: u32,
    flush_every: u32,
    max_pages: u32,
    filter: Option<&str>,
) -> EngineOptions {
    EngineOptions {
        paginator: PaginatorConfig {
            page_size,
            max_pages,
            page_delay: Duration::ZERO,
        },
        flush_every,
        filter: filter.map(str::to_string),
    }
}
