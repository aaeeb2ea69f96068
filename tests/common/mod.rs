#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use jobpipe::extract::{Extractor, ExtractorRegistry};
use jobpipe::memory::{MemoryRecordStore, MemoryWorkQueue};
use jobpipe::worker::{Worker, WorkerConfig};
use jobpipe::{JobRecord, RecordStore, TaskKind, WorkQueue};

/// Extractor that replays a fixed script of outcomes, repeating the last
/// entry once the script runs out. `Ok("")` models a soft failure.
pub struct ScriptedExtractor {
    calls: AtomicUsize,
    delay: Duration,
    script: Vec<Result<String, String>>,
}

impl ScriptedExtractor {
    pub fn new(script: Vec<Result<String, String>>) -> Self {
        assert!(!script.is_empty());
        ScriptedExtractor {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            script,
        }
    }

    pub fn always_ok(result: &str) -> Self {
        Self::new(vec![Ok(result.to_string())])
    }

    pub fn always_empty() -> Self {
        Self::new(vec![Ok(String::new())])
    }

    pub fn always_err(message: &str) -> Self {
        Self::new(vec![Err(message.to_string())])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    async fn extract(&self, _kind: TaskKind, _payload: &str) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        let step = self
            .script
            .get(call)
            .unwrap_or_else(|| self.script.last().unwrap());
        match step {
            Ok(result) => Ok(result.clone()),
            Err(message) => Err(anyhow!(message.clone())),
        }
    }
}

/// Retry policy tight enough for tests to converge in milliseconds.
pub fn fast_config() -> WorkerConfig {
    WorkerConfig::default()
        .with_max_attempts(3)
        .with_retry_base_delay(Duration::from_millis(5))
        .with_extract_timeout(Duration::from_secs(5))
}

pub fn spawn_worker(
    store: Arc<MemoryRecordStore>,
    queue: Arc<MemoryWorkQueue>,
    dead_letter: Arc<MemoryWorkQueue>,
    extractor: Arc<dyn Extractor>,
    config: WorkerConfig,
) -> (CancellationToken, tokio::task::JoinHandle<()>) {
    let worker = Worker::new(
        store,
        queue,
        dead_letter,
        ExtractorRegistry::uniform(extractor),
        config,
    );
    let token = CancellationToken::new();
    let run_token = token.clone();
    let handle = tokio::spawn(async move { worker.run(run_token).await });
    (token, handle)
}

const POLL: Duration = Duration::from_millis(10);
const ROUNDS: usize = 300;

/// Record once it leaves the Queued status.
pub async fn wait_for_settled(store: &MemoryRecordStore, uid: Uuid) -> JobRecord {
    for _ in 0..ROUNDS {
        if let Ok(record) = store.get(uid).await {
            if record.is_settled() {
                return record;
            }
        }
        sleep(POLL).await;
    }
    panic!("job {uid} did not settle in time");
}

/// Record once it reaches the given status code.
pub async fn wait_for_status(store: &MemoryRecordStore, uid: Uuid, code: i32) -> JobRecord {
    for _ in 0..ROUNDS {
        if let Ok(record) = store.get(uid).await {
            if record.status_code == code {
                return record;
            }
        }
        sleep(POLL).await;
    }
    panic!("job {uid} never reached status {code}");
}

pub async fn wait_for_calls(extractor: &ScriptedExtractor, at_least: usize) {
    for _ in 0..ROUNDS {
        if extractor.calls() >= at_least {
            return;
        }
        sleep(POLL).await;
    }
    panic!(
        "extractor reached only {} of {at_least} calls",
        extractor.calls()
    );
}

pub async fn wait_for_pending(queue: &MemoryWorkQueue, expected: i64) {
    for _ in 0..ROUNDS {
        if queue.pending_count().await.unwrap() == expected {
            return;
        }
        sleep(POLL).await;
    }
    panic!("queue never reached {expected} pending envelopes");
}
