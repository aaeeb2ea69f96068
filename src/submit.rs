use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::SubmitError;
use crate::{JobEnvelope, JobRecord, RecordStore, TaskKind, WorkQueue};

/// Accepts jobs: assigns the uid and timestamp, writes the initial record,
/// then enqueues the envelope.
///
/// The record write strictly precedes the enqueue, so a consumer that pops
/// the envelope always finds a record to update.
pub struct Submitter {
    store: Arc<dyn RecordStore>,
    queue: Arc<dyn WorkQueue>,
}

impl Submitter {
    pub fn new(store: Arc<dyn RecordStore>, queue: Arc<dyn WorkQueue>) -> Self {
        Submitter { store, queue }
    }

    #[instrument(skip(self, payload), fields(task = %kind))]
    pub async fn submit(&self, kind: TaskKind, payload: String) -> Result<Uuid, SubmitError> {
        let uid = Uuid::new_v4();
        let ts = Utc::now();

        let record = JobRecord::queued(uid, ts, kind, payload.clone());
        self.store.put(&record).await?;

        let envelope = JobEnvelope::new(uid, ts, kind, payload);
        if let Err(source) = self.queue.enqueue(&envelope).await {
            // The record stays behind as Queued with no consumer coming;
            // surfaced to the caller instead of deleted.
            warn!(%uid, error = %source, "Job recorded but enqueue failed");
            return Err(SubmitError::Enqueue { uid, source });
        }

        debug!(%uid, "Job submitted");
        Ok(uid)
    }
}
