//! End-to-end pipeline tests over the sled-backed table and queue
//!
//! Events go in through the queue, the scanner drains quiesced entities,
//! and every entity is processed exactly once per window no matter how many
//! events it received.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use journal::{SledQueue, SledStateStore};
use parking_lot::Mutex;
use quiesce_core::{
    Clock, Disposition, EntityId, ManualClock, MessageQueue, Result, Settings, StateStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use watcher::metrics::{ENTITIES_PROCESSED, EVENTS_INGESTED, MESSAGES_DISCARDED};
use watcher::{MemorySink, Pipeline, Processor, Roles, Services};

#[derive(Default)]
struct RecordingProcessor {
    calls: Mutex<Vec<EntityId>>,
}

#[async_trait]
impl Processor for RecordingProcessor {
    async fn process(&self, entity: &EntityId) -> Result<()> {
        self.calls.lock().push(entity.clone());
        Ok(())
    }
}

struct Fixture {
    _dir: TempDir,
    settings: Settings,
    store: Arc<SledStateStore>,
    queue: Arc<SledQueue>,
    processor: Arc<RecordingProcessor>,
    metrics: Arc<MemorySink>,
    clock: Arc<ManualClock>,
}

impl Fixture {
    fn new(disposition: Disposition) -> Self {
        let dir = TempDir::new().unwrap();
        let settings = Settings {
            queue: Some(dir.path().join("queue")),
            table: Some(dir.path().join("table")),
            state_dir: dir.path().join("state"),
            debounce_window_secs: 15,
            continuous_interval_secs: 60,
            poll_interval_secs: 1,
            receive_wait_secs: 1,
            disposition,
            ingest_workers: 2,
            ..Settings::default()
        };

        let store = Arc::new(SledStateStore::open(&path(&settings.table)).unwrap());
        let queue = Arc::new(
            SledQueue::open(&path(&settings.queue), settings.visibility_timeout()).unwrap(),
        );

        Self {
            _dir: dir,
            settings,
            store,
            queue,
            processor: Arc::new(RecordingProcessor::default()),
            metrics: Arc::new(MemorySink::new()),
            clock: Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap())),
        }
    }

    fn spawn(&self) -> Pipeline {
        let services = Services {
            store: self.store.clone(),
            queue: self.queue.clone(),
            processor: self.processor.clone(),
            metrics: self.metrics.clone(),
            clock: self.clock.clone(),
        };
        Pipeline::spawn(services, &self.settings, Roles::default(), CancellationToken::new()).unwrap()
    }

    async fn wait_for(&self, what: &str, check: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {}", what));
    }
}

fn path(location: &Option<PathBuf>) -> PathBuf {
    location.clone().unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_burst_of_events_processed_once_per_entity() {
    let fixture = Fixture::new(Disposition::Drain);
    let pipeline = fixture.spawn();

    for _ in 0..5 {
        fixture.queue.send(r#"{"Id":"abc"}"#.to_string()).await.unwrap();
    }
    fixture.queue.send(r#"{"Id":"def","Kind":"deleted"}"#.to_string()).await.unwrap();
    fixture.queue.send(r#"{"foo":"bar"}"#.to_string()).await.unwrap();

    let metrics = fixture.metrics.clone();
    fixture
        .wait_for("ingestion", || {
            metrics.get(EVENTS_INGESTED) == 6 && metrics.get(MESSAGES_DISCARDED) == 1
        })
        .await;
    assert_eq!(fixture.queue.pending().await.unwrap(), 0);
    assert_eq!(fixture.store.count().await.unwrap(), 2);

    // Still inside the debounce window: nothing processed
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert!(fixture.processor.calls.lock().is_empty());

    fixture.clock.advance(chrono::Duration::seconds(16));
    let metrics = fixture.metrics.clone();
    fixture
        .wait_for("processing", || metrics.get(ENTITIES_PROCESSED) == 2)
        .await;

    pipeline.shutdown().await;

    let mut calls = fixture.processor.calls.lock().clone();
    calls.sort();
    assert_eq!(calls, vec![EntityId::new("abc").unwrap(), EntityId::new("def").unwrap()]);
    assert_eq!(fixture.store.count().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_continuous_policy_keeps_record() {
    let fixture = Fixture::new(Disposition::Continuous);
    let pipeline = fixture.spawn();

    fixture.queue.send(r#"{"Id":"xyz"}"#.to_string()).await.unwrap();
    let metrics = fixture.metrics.clone();
    fixture.wait_for("ingestion", || metrics.get(EVENTS_INGESTED) == 1).await;

    fixture.clock.advance(chrono::Duration::seconds(15));
    let metrics = fixture.metrics.clone();
    fixture
        .wait_for("first pass", || metrics.get(ENTITIES_PROCESSED) == 1)
        .await;

    pipeline.shutdown().await;

    let state = fixture
        .store
        .get(&EntityId::new("xyz").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.last_processed_time, Some(fixture.clock.now()));
}
