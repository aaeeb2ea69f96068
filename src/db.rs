use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Executor, FromRow};
use tokio::time::sleep;
use tracing::debug;
use uuid::Uuid;

use crate::error::{QueueError, StoreError};
use crate::{EnvelopeData, JobEnvelope, JobRecord, RecordStore, WorkQueue};

/// Build the shared connection pool and run the idempotent schema bootstrap.
///
/// Called once at process start; the returned pool is cloned into every
/// adapter that needs it. Failure here is fatal by design.
pub async fn connect(url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;

    (&pool).execute(include_str!("setup.sql")).await?;

    Ok(pool)
}

#[derive(FromRow)]
struct RecordRow {
    uid: Uuid,
    ts: DateTime<Utc>,
    task: Option<String>,
    data_info: String,
    status_code: i32,
    status_name: String,
    final_result: Option<String>,
}

impl From<RecordRow> for JobRecord {
    fn from(row: RecordRow) -> Self {
        JobRecord {
            uid: row.uid,
            ts: row.ts,
            task: row.task,
            data: EnvelopeData {
                data_info: row.data_info,
            },
            status_code: row.status_code,
            status_name: row.status_name,
            final_result: row.final_result,
        }
    }
}

/// Record store backed by the `job_records` table.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: Arc<PgPool>,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        PgRecordStore {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn put(&self, record: &JobRecord) -> Result<(), StoreError> {
        debug!(uid = %record.uid, "Creating job record");
        sqlx::query(
            "INSERT INTO job_records \
                (uid, ts, task, data_info, status_code, status_name, final_result) \
            VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(record.uid)
        .bind(record.ts)
        .bind(&record.task)
        .bind(&record.data.data_info)
        .bind(record.status_code)
        .bind(&record.status_name)
        .bind(&record.final_result)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    async fn patch_status(
        &self,
        uid: Uuid,
        status_code: i32,
        status_name: &str,
        final_result: Option<&str>,
    ) -> Result<(), StoreError> {
        debug!(%uid, status_code, status_name, "Updating job status");
        let done = sqlx::query(
            "UPDATE job_records \
                SET status_code = $1, \
                status_name = $2, \
                final_result = $3 \
            WHERE uid = $4",
        )
        .bind(status_code)
        .bind(status_name)
        .bind(final_result)
        .bind(uid)
        .execute(&*self.pool)
        .await?;

        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound(uid));
        }

        Ok(())
    }

    async fn get(&self, uid: Uuid) -> Result<JobRecord, StoreError> {
        let row = sqlx::query_as::<_, RecordRow>(
            "SELECT uid, ts, task, data_info, status_code, status_name, final_result \
            FROM job_records \
            WHERE uid = $1",
        )
        .bind(uid)
        .fetch_optional(&*self.pool)
        .await?;

        row.map(JobRecord::from).ok_or(StoreError::NotFound(uid))
    }

    async fn list_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        let uids = sqlx::query_scalar::<_, Uuid>("SELECT uid FROM job_records")
            .fetch_all(&*self.pool)
            .await?;

        Ok(uids)
    }
}

/// Work queue backed by the `work_queue` table.
///
/// An envelope is claimed with a `DELETE … FOR UPDATE SKIP LOCKED` so each
/// row goes to exactly one of the competing consumers. The pending wait is
/// a poll at `poll_interval`; callers race `dequeue` against their
/// cancellation signal.
#[derive(Clone)]
pub struct PgWorkQueue {
    pool: Arc<PgPool>,
    name: String,
    poll_interval: Duration,
}

impl PgWorkQueue {
    pub fn new(pool: PgPool, name: impl Into<String>) -> Self {
        PgWorkQueue {
            pool: Arc::new(pool),
            name: name.into(),
            poll_interval: Duration::from_millis(500),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    async fn insert(&self, envelope: &JobEnvelope, delay: Duration) -> Result<(), QueueError> {
        let payload = serde_json::to_value(envelope)?;
        sqlx::query(
            "INSERT INTO work_queue (queue, envelope, available_at) \
            VALUES ($1, $2, now() + make_interval(secs => $3))",
        )
        .bind(&self.name)
        .bind(payload)
        .bind(delay.as_secs_f64())
        .execute(&*self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl WorkQueue for PgWorkQueue {
    async fn enqueue(&self, envelope: &JobEnvelope) -> Result<(), QueueError> {
        self.insert(envelope, Duration::ZERO).await
    }

    async fn enqueue_after(
        &self,
        envelope: &JobEnvelope,
        delay: Duration,
    ) -> Result<(), QueueError> {
        self.insert(envelope, delay).await
    }

    async fn dequeue(&self) -> Result<JobEnvelope, QueueError> {
        loop {
            let claimed = sqlx::query_scalar::<_, serde_json::Value>(
                "DELETE FROM work_queue \
                WHERE seq = ( \
                    SELECT seq FROM work_queue \
                    WHERE queue = $1 AND available_at <= now() \
                    ORDER BY seq \
                    LIMIT 1 \
                    FOR UPDATE SKIP LOCKED \
                ) \
                RETURNING envelope",
            )
            .bind(&self.name)
            .fetch_optional(&*self.pool)
            .await?;

            match claimed {
                Some(payload) => return Ok(serde_json::from_value(payload)?),
                None => sleep(self.poll_interval).await,
            }
        }
    }

    async fn pending_count(&self) -> Result<i64, QueueError> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT count(*) FROM work_queue WHERE queue = $1")
                .bind(&self.name)
                .fetch_one(&*self.pool)
                .await?;

        Ok(count)
    }
}
