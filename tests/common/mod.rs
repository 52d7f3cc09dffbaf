//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use feedline::{
    FetchError, RemoteStatus, StatusId, StoreConfig, TimelineKey, TimelineSource, TimelineStore,
    TimelineType, Timestamp, UserKey,
};
use parking_lot::Mutex;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

pub fn test_config(dir: &TempDir) -> StoreConfig {
    StoreConfig {
        path: dir.path().join("store"),
        ..Default::default()
    }
}

/// Route store and mediator logs to the test harness output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn test_store(dir: &TempDir) -> Arc<TimelineStore> {
    init_tracing();
    Arc::new(TimelineStore::create(test_config(dir)).unwrap())
}

pub fn owner() -> UserKey {
    UserKey::new("u1", "example.social")
}

pub fn home() -> TimelineKey {
    TimelineKey::new(owner(), TimelineType::Home)
}

pub fn remote(n: i64) -> RemoteStatus {
    RemoteStatus::new(
        n.to_string(),
        Timestamp::from_millis(n),
        UserKey::new(format!("author{}", n % 3), "example.social"),
        format!("post {}", n),
    )
}

pub fn ids(entries: &[feedline::TimelineEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|e| e.status_id().as_str().to_string())
        .collect()
}

/// One request seen by the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    pub page_size: usize,
    pub max_id: Option<StatusId>,
    pub since_id: Option<StatusId>,
}

/// In-memory remote timeline honoring max_id / since_id cursors.
pub struct FakeServer {
    /// Newest first.
    items: Mutex<Vec<RemoteStatus>>,
    failures: Mutex<Vec<FetchError>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<Request>>,
}

impl FakeServer {
    pub fn new(items: Vec<RemoteStatus>) -> Arc<Self> {
        let server = Self {
            items: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        };
        server.publish(items);
        Arc::new(server)
    }

    /// Server holding statuses with ids in `range`.
    pub fn with_range(range: RangeInclusive<i64>) -> Arc<Self> {
        Self::new(range.map(remote).collect())
    }

    /// Add statuses, e.g. newly posted ones.
    pub fn publish(&self, new_items: Vec<RemoteStatus>) {
        let mut items = self.items.lock();
        items.extend(new_items);
        items.sort_by(|a, b| b.id.cmp(&a.id));
    }

    /// Make the next fetch fail with `error`.
    pub fn fail_next(&self, error: FetchError) {
        self.failures.lock().push(error);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl TimelineSource for FakeServer {
    async fn fetch_between(
        &self,
        page_size: usize,
        max_id: Option<&StatusId>,
        since_id: Option<&StatusId>,
    ) -> Result<Vec<RemoteStatus>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(Request {
            page_size,
            max_id: max_id.cloned(),
            since_id: since_id.cloned(),
        });

        if let Some(error) = self.failures.lock().pop() {
            return Err(error);
        }

        Ok(self
            .items
            .lock()
            .iter()
            .filter(|item| max_id.map_or(true, |max| item.id < *max))
            .filter(|item| since_id.map_or(true, |since| item.id > *since))
            .take(page_size)
            .cloned()
            .collect())
    }
}
