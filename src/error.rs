use thiserror::Error;
use uuid::Uuid;

/// A `task` string that names no registered kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized task kind: {0}")]
pub struct UnknownTaskKind(pub String);

/// Failures of the record store collaborator.
///
/// `NotFound` is kept apart from transport failures: a status query for an
/// unknown uid is an answer, a broken connection is not.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no job record for {0}")]
    NotFound(Uuid),

    #[error("record store backend error: {0}")]
    Backend(#[from] sqlx::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Failures of the work queue collaborator.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue can no longer deliver; consumers should stop.
    #[error("work queue is closed")]
    Closed,

    #[error("work queue backend error: {0}")]
    Backend(#[from] sqlx::Error),

    /// The popped payload did not parse as an envelope. There is no uid to
    /// report a status against, so callers log and move on.
    #[error("queued payload is not a job envelope: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Failures surfaced to submitters.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("failed to persist job record: {0}")]
    Store(#[from] StoreError),

    /// The record was written but the envelope never made it onto the
    /// queue: the job stays visible as Queued with no consumer coming.
    /// Reported rather than masked by a compensating delete.
    #[error("job {uid} recorded but not enqueued: {source}")]
    Enqueue {
        uid: Uuid,
        #[source]
        source: QueueError,
    },
}
