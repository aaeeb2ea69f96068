use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod db;
pub mod error;
pub mod extract;
pub mod memory;
pub mod status;
pub mod submit;
pub mod telemetry;
pub mod worker;

pub use error::{QueueError, StoreError, SubmitError};

/// Separator placed between extracted items in a job result.
pub const RESULT_SEPARATOR: &str = "<sep>";

/// Queue carrying pending envelopes.
pub const WORK_QUEUE: &str = "worker_queue";

/// Queue where envelopes are parked once their retries are exhausted.
pub const DEAD_LETTER_QUEUE: &str = "dead_letter_queue";

pub const STATUS_QUEUED: i32 = 202;
pub const STATUS_DONE: i32 = 200;
pub const STATUS_FAILED: i32 = 500;

pub const STATUS_NAME_QUEUED: &str = "Queued";

/// Status written for envelopes without a recognizable task kind.
pub const STATUS_NAME_CORRUPT: &str = "failed job due to missing data field, data is corrupt";

/// The kinds of extraction work the pipeline knows how to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    JobAdUpload,
    ResumeUpload,
}

impl TaskKind {
    /// Wire name carried in the `task` field of envelopes and records.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::JobAdUpload => "job_ad_upload",
            TaskKind::ResumeUpload => "resume_upload",
        }
    }

    /// Short label used in success status names ("job_ad processed").
    pub fn label(&self) -> &'static str {
        match self {
            TaskKind::JobAdUpload => "job_ad",
            TaskKind::ResumeUpload => "resume",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskKind {
    type Err = error::UnknownTaskKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "job_ad_upload" => Ok(TaskKind::JobAdUpload),
            "resume_upload" => Ok(TaskKind::ResumeUpload),
            other => Err(error::UnknownTaskKind(other.to_string())),
        }
    }
}

/// Payload wrapper shared by the envelope and record wire formats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeData {
    /// Raw text for job ads, a filesystem path for resumes.
    pub data_info: String,
}

/// Transient queue message describing one unit of work.
///
/// `task` stays a raw string here: external producers may enqueue anything,
/// and the worker parses it into a [`TaskKind`] at dispatch time. `attempt`
/// counts redeliveries; producers that omit it start at zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub uid: Uuid,
    pub ts: DateTime<Utc>,
    pub task: Option<String>,
    pub data: EnvelopeData,
    #[serde(default)]
    pub attempt: u32,
}

impl JobEnvelope {
    pub fn new(uid: Uuid, ts: DateTime<Utc>, kind: TaskKind, data_info: String) -> Self {
        JobEnvelope {
            uid,
            ts,
            task: Some(kind.as_str().to_string()),
            data: EnvelopeData { data_info },
            attempt: 0,
        }
    }

    /// The parsed task kind, or `None` when the field is absent or not a
    /// recognized kind (both are treated as corrupt data downstream).
    pub fn task_kind(&self) -> Option<TaskKind> {
        self.task.as_deref().and_then(|s| s.parse().ok())
    }
}

/// Durable, queryable row describing a job's submission and outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub uid: Uuid,
    pub ts: DateTime<Utc>,
    pub task: Option<String>,
    pub data: EnvelopeData,
    pub status_code: i32,
    pub status_name: String,
    pub final_result: Option<String>,
}

impl JobRecord {
    /// Fresh record as written at submission time.
    pub fn queued(uid: Uuid, ts: DateTime<Utc>, kind: TaskKind, data_info: String) -> Self {
        JobRecord {
            uid,
            ts,
            task: Some(kind.as_str().to_string()),
            data: EnvelopeData { data_info },
            status_code: STATUS_QUEUED,
            status_name: STATUS_NAME_QUEUED.to_string(),
            final_result: None,
        }
    }

    /// Whether the job has reached a terminal status.
    pub fn is_settled(&self) -> bool {
        self.status_code != STATUS_QUEUED
    }
}

/// Keyed storage for job records plus a secondary index over all uids.
///
/// Implementations must report a missing key as [`StoreError::NotFound`],
/// distinct from transport failures, so callers can route the two
/// differently.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Full create of a fresh record.
    async fn put(&self, record: &JobRecord) -> Result<(), StoreError>;

    /// Overwrite only the status fields, leaving submission fields untouched.
    async fn patch_status(
        &self,
        uid: Uuid,
        status_code: i32,
        status_name: &str,
        final_result: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn get(&self, uid: Uuid) -> Result<JobRecord, StoreError>;

    /// All known uids, via the secondary index. Unordered, no duplicates.
    async fn list_ids(&self) -> Result<Vec<Uuid>, StoreError>;
}

/// Durable channel carrying pending job envelopes to competing consumers.
///
/// Every enqueued envelope is delivered to exactly one consumer. Delivery
/// order is arrival order.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn enqueue(&self, envelope: &JobEnvelope) -> Result<(), QueueError>;

    /// Enqueue an envelope that only becomes visible to consumers after
    /// `delay`. Used for retry backoff.
    async fn enqueue_after(
        &self,
        envelope: &JobEnvelope,
        delay: Duration,
    ) -> Result<(), QueueError>;

    /// Next available envelope; pends until one arrives. Callers that need
    /// to stay responsive to shutdown race this against a cancellation
    /// signal.
    async fn dequeue(&self) -> Result<JobEnvelope, QueueError>;

    /// Number of envelopes currently waiting (including delayed ones not
    /// yet visible, for the PostgreSQL adapter).
    async fn pending_count(&self) -> Result<i64, QueueError>;
}
