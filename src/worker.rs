use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::extract::ExtractorRegistry;
use crate::{
    JobEnvelope, QueueError, RecordStore, WorkQueue, STATUS_DONE, STATUS_FAILED,
    STATUS_NAME_CORRUPT,
};

/// Processing policy for a worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Redeliveries after which an envelope is dead-lettered.
    pub max_attempts: u32,
    /// Backoff before the first retry; doubles per attempt.
    pub retry_base_delay: Duration,
    /// Ceiling for the exponential backoff.
    pub retry_max_delay: Duration,
    /// Deadline for one extractor call; expiry is a hard failure.
    pub extract_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            max_attempts: 5,
            retry_base_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(60),
            extract_timeout: Duration::from_secs(60),
        }
    }
}

impl WorkerConfig {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn with_extract_timeout(mut self, deadline: Duration) -> Self {
        self.extract_timeout = deadline;
        self
    }

    /// Backoff for the given attempt number (1-based): base * 2^(n-1),
    /// capped at `retry_max_delay`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        self.retry_base_delay
            .saturating_mul(1 << exp)
            .min(self.retry_max_delay)
    }
}

/// Queue consumer: pops envelopes, dispatches by task kind, records the
/// outcome, and routes failures through bounded retry.
///
/// Every failure inside a cycle is converted into a status write plus a
/// requeue or dead-letter; nothing propagates out of the loop.
pub struct Worker {
    store: Arc<dyn RecordStore>,
    queue: Arc<dyn WorkQueue>,
    dead_letter: Arc<dyn WorkQueue>,
    extractors: ExtractorRegistry,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        store: Arc<dyn RecordStore>,
        queue: Arc<dyn WorkQueue>,
        dead_letter: Arc<dyn WorkQueue>,
        extractors: ExtractorRegistry,
        config: WorkerConfig,
    ) -> Self {
        Worker {
            store,
            queue,
            dead_letter,
            extractors,
            config,
        }
    }

    /// Consume until cancelled. An in-flight cycle always finishes before
    /// cancellation is honored.
    pub async fn run(&self, cancel_token: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    debug!("Worker Cancelled");
                    break;
                },
                popped = self.queue.dequeue() => {
                    match popped {
                        Ok(envelope) => self.process(envelope).await,
                        Err(QueueError::Closed) => {
                            error!("Work queue closed, exiting");
                            break;
                        },
                        Err(err) => {
                            // No uid to report against; drop and keep consuming.
                            error!(error = %err, "Dropping undecodable queue payload");
                        }
                    }
                }
            }
        }
        info!("Worker stopped.");
    }

    #[instrument(skip(self, envelope), fields(uid = %envelope.uid, attempt = envelope.attempt))]
    async fn process(&self, envelope: JobEnvelope) {
        let Some(kind) = envelope.task_kind() else {
            warn!(task = ?envelope.task, "Envelope has no usable task kind");
            self.mark_failed(&envelope, STATUS_NAME_CORRUPT).await;
            self.retry(envelope, STATUS_NAME_CORRUPT).await;
            return;
        };

        let extraction = self
            .extractors
            .get(kind)
            .extract(kind, &envelope.data.data_info);
        let outcome = match timeout(self.config.extract_timeout, extraction).await {
            Ok(outcome) => outcome,
            Err(_) => Err(anyhow!(
                "extraction exceeded deadline of {:?}",
                self.config.extract_timeout
            )),
        };

        match outcome {
            Ok(result) if !result.is_empty() => {
                let status_name = format!("{} processed", kind.label());
                debug!(status_name, "Job succeeded");
                if let Err(err) = self
                    .store
                    .patch_status(envelope.uid, STATUS_DONE, &status_name, Some(&result))
                    .await
                {
                    error!(error = %err, "Failed to record successful result");
                }
            }
            Ok(_) => {
                // Soft failure: nothing usable came back. The record keeps
                // its last status while the envelope goes around again.
                debug!("Extraction produced no output");
                self.retry(envelope, "extraction produced no output").await;
            }
            Err(err) => {
                let status_name = format!("{} processing failed due to {err:#}", kind.label());
                warn!(error = %err, "Extraction failed");
                self.mark_failed(&envelope, &status_name).await;
                self.retry(envelope, &status_name).await;
            }
        }
    }

    async fn mark_failed(&self, envelope: &JobEnvelope, status_name: &str) {
        if let Err(err) = self
            .store
            .patch_status(envelope.uid, STATUS_FAILED, status_name, None)
            .await
        {
            error!(error = %err, "Failed to record failure status");
        }
    }

    /// Redeliver with backoff, or park on the dead-letter queue once the
    /// attempt cap is reached.
    async fn retry(&self, mut envelope: JobEnvelope, reason: &str) {
        envelope.attempt += 1;

        if envelope.attempt >= self.config.max_attempts {
            let status_name = format!(
                "failed permanently after {} attempts: {reason}",
                envelope.attempt
            );
            warn!(attempt = envelope.attempt, "Retries exhausted, dead-lettering");
            self.mark_failed(&envelope, &status_name).await;
            if let Err(err) = self.dead_letter.enqueue(&envelope).await {
                error!(error = %err, "Failed to park envelope on dead letter queue");
            }
            return;
        }

        let delay = self.config.backoff_delay(envelope.attempt);
        debug!(
            attempt = envelope.attempt,
            delay_ms = delay.as_millis() as u64,
            "Requeueing for retry"
        );
        if let Err(err) = self.queue.enqueue_after(&envelope, delay).await {
            error!(error = %err, "Failed to requeue envelope");
        }
    }
}
