use std::sync::Arc;

use uuid::Uuid;

use crate::error::StoreError;
use crate::RecordStore;

/// Status fields of one job, in query-response shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub status_name: String,
    pub status_code: i32,
    pub final_result: Option<String>,
}

/// Read path for status queries; independent of the processing side.
pub struct StatusReader {
    store: Arc<dyn RecordStore>,
}

impl StatusReader {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        StatusReader { store }
    }

    /// Status of a job by uid. An unknown uid surfaces
    /// [`StoreError::NotFound`], never an implicit Queued.
    pub async fn get_status(&self, uid: Uuid) -> Result<JobStatus, StoreError> {
        let record = self.store.get(uid).await?;
        Ok(JobStatus {
            status_name: record.status_name,
            status_code: record.status_code,
            final_result: record.final_result,
        })
    }

    /// Uids of every known job, via the store's secondary index.
    pub async fn list_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        self.store.list_ids().await
    }
}
