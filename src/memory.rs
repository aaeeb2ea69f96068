//! In-process implementations of the store and queue collaborators.
//!
//! Used by the test suite and for embedding the pipeline without external
//! services. The queue is an MPMC channel, so competing consumers get the
//! same one-envelope-one-consumer delivery as the PostgreSQL adapter.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_channel::{Receiver, Sender};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::sleep;
use uuid::Uuid;

use crate::error::{QueueError, StoreError};
use crate::{JobEnvelope, JobRecord, RecordStore, WorkQueue};

#[derive(Default)]
struct StoreInner {
    records: HashMap<Uuid, JobRecord>,
    index: BTreeSet<Uuid>,
}

/// Record store over a keyed map with a uid index maintained on write.
#[derive(Default)]
pub struct MemoryRecordStore {
    inner: RwLock<StoreInner>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop and rebuild the uid index from the primary records. Idempotent;
    /// the write path keeps the index current, so this exists for parity
    /// with stores whose index can go missing independently of the data.
    pub async fn rebuild_index(&self) {
        let mut inner = self.inner.write().await;
        inner.index = inner.records.keys().copied().collect();
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn put(&self, record: &JobRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.index.insert(record.uid);
        inner.records.insert(record.uid, record.clone());
        Ok(())
    }

    async fn patch_status(
        &self,
        uid: Uuid,
        status_code: i32,
        status_name: &str,
        final_result: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let record = inner.records.get_mut(&uid).ok_or(StoreError::NotFound(uid))?;
        record.status_code = status_code;
        record.status_name = status_name.to_string();
        record.final_result = final_result.map(str::to_string);
        Ok(())
    }

    async fn get(&self, uid: Uuid) -> Result<JobRecord, StoreError> {
        let inner = self.inner.read().await;
        inner
            .records
            .get(&uid)
            .cloned()
            .ok_or(StoreError::NotFound(uid))
    }

    async fn list_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.index.iter().copied().collect())
    }
}

/// Work queue over an unbounded MPMC channel.
#[derive(Clone)]
pub struct MemoryWorkQueue {
    tx: Sender<JobEnvelope>,
    rx: Receiver<JobEnvelope>,
}

impl MemoryWorkQueue {
    pub fn new() -> Self {
        let (tx, rx) = async_channel::unbounded();
        MemoryWorkQueue { tx, rx }
    }
}

impl Default for MemoryWorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkQueue for MemoryWorkQueue {
    async fn enqueue(&self, envelope: &JobEnvelope) -> Result<(), QueueError> {
        self.tx
            .send(envelope.clone())
            .await
            .map_err(|_| QueueError::Closed)
    }

    async fn enqueue_after(
        &self,
        envelope: &JobEnvelope,
        delay: Duration,
    ) -> Result<(), QueueError> {
        let tx = self.tx.clone();
        let envelope = envelope.clone();
        tokio::spawn(async move {
            sleep(delay).await;
            let _ = tx.send(envelope).await;
        });
        Ok(())
    }

    async fn dequeue(&self) -> Result<JobEnvelope, QueueError> {
        self.rx.recv().await.map_err(|_| QueueError::Closed)
    }

    async fn pending_count(&self) -> Result<i64, QueueError> {
        Ok(self.rx.len() as i64)
    }
}
