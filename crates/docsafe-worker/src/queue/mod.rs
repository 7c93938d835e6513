//! Scan task queue: enqueue, receive-then-delete dequeue, retry and dead-letter.
//!
//! Redelivery is never relied on. A message is deleted from the primary queue
//! as soon as it is received, and every further attempt is an explicit
//! re-enqueue of a copy with `retryCount` advanced. The counter lives in the
//! message body; transport-level receive counts are ignored.

pub mod memory;
#[cfg(feature = "queue-sqs")]
pub mod sqs;

use async_trait::async_trait;
use chrono::Utc;
use docsafe_core::config::QueueConfig;
use docsafe_core::constants::MAX_DEQUEUE_BATCH;
use docsafe_core::models::{DeadLetterRecord, MalformedMessageRecord, ScanTask};
use docsafe_core::validation::validate_identifier;
use docsafe_core::AppError;
use docsafe_storage::keys::{parse_storage_path, validate_tenant_id};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use memory::InMemoryQueueBackend;
#[cfg(feature = "queue-sqs")]
pub use sqs::SqsQueueBackend;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Purge failed: {0}")]
    PurgeFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Serialization(e) => AppError::Internal(format!("task encoding: {}", e)),
            QueueError::ConfigError(msg) => AppError::Internal(msg),
            other => AppError::dependency("queue", other),
        }
    }
}

/// A message handed out by [`QueueBackend::receive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub body: String,
    /// Opaque handle for [`QueueBackend::delete`]; valid for this delivery only.
    pub receipt_handle: String,
}

/// Queue transport primitives.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    async fn send(&self, body: &str) -> Result<(), QueueError>;

    /// Receive up to `max_messages`. Received messages stay invisible to other
    /// receivers for `visibility_timeout` unless deleted. Waits up to `wait`
    /// for at least one message.
    async fn receive(
        &self,
        max_messages: usize,
        visibility_timeout: Duration,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError>;

    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError>;

    async fn purge(&self) -> Result<(), QueueError>;

    fn name(&self) -> &'static str;
}

#[derive(Clone, Debug)]
pub struct ScanTaskQueueConfig {
    /// Upper bound for one dequeue batch, itself capped at [`MAX_DEQUEUE_BATCH`].
    pub max_batch_size: usize,
    pub visibility_timeout: Duration,
    pub wait_time: Duration,
}

impl Default for ScanTaskQueueConfig {
    fn default() -> Self {
        Self {
            max_batch_size: MAX_DEQUEUE_BATCH,
            visibility_timeout: Duration::from_secs(30),
            wait_time: Duration::ZERO,
        }
    }
}

impl From<&QueueConfig> for ScanTaskQueueConfig {
    fn from(config: &QueueConfig) -> Self {
        Self {
            max_batch_size: config.max_batch_size,
            visibility_timeout: Duration::from_secs(config.visibility_timeout_secs.max(0) as u64),
            wait_time: Duration::from_secs(config.wait_time_secs.max(0) as u64),
        }
    }
}

/// Durable queue of [`ScanTask`]s with a separate dead-letter channel.
#[derive(Clone)]
pub struct ScanTaskQueue {
    primary: Arc<dyn QueueBackend>,
    dead_letter: Arc<dyn QueueBackend>,
    config: ScanTaskQueueConfig,
}

impl ScanTaskQueue {
    pub fn new(
        primary: Arc<dyn QueueBackend>,
        dead_letter: Arc<dyn QueueBackend>,
        config: ScanTaskQueueConfig,
    ) -> Self {
        Self {
            primary,
            dead_letter,
            config,
        }
    }

    /// Effective batch ceiling.
    pub fn max_batch_size(&self) -> usize {
        self.config.max_batch_size.clamp(1, MAX_DEQUEUE_BATCH)
    }

    fn validate(task: &ScanTask) -> Result<(), AppError> {
        validate_tenant_id(&task.tenant_id)?;
        validate_identifier("document_id", &task.document_id)?;
        validate_identifier("version_id", &task.version_id)?;
        let parsed = parse_storage_path(&task.storage_path)?;
        if parsed.tenant_id != task.tenant_id {
            return Err(AppError::Validation(format!(
                "storage path {} does not belong to tenant {}",
                task.storage_path, task.tenant_id
            )));
        }
        Ok(())
    }

    /// Serialize and send a task.
    #[tracing::instrument(skip(self, task), fields(tenant_id = %task.tenant_id, document_id = %task.document_id, retry_count = task.retry_count))]
    pub async fn enqueue(&self, task: &ScanTask) -> Result<(), AppError> {
        Self::validate(task)?;
        let body = serde_json::to_string(task).map_err(QueueError::from)?;
        self.primary.send(&body).await.map_err(|e| {
            tracing::error!(error = %e, queue = self.primary.name(), "Failed to enqueue scan task");
            AppError::from(e)
        })?;
        tracing::debug!("Scan task enqueued");
        Ok(())
    }

    /// Receive and delete one task.
    pub async fn dequeue(&self) -> Result<Option<ScanTask>, AppError> {
        Ok(self.dequeue_batch(1).await?.into_iter().next())
    }

    /// Receive and delete up to `max` tasks, never more than [`Self::max_batch_size`].
    ///
    /// A message whose delete fails is left for redelivery and not returned.
    /// A message that does not decode as a task is copied to the dead-letter
    /// channel before it is deleted; if that copy fails it stays on the
    /// primary queue for redelivery.
    pub async fn dequeue_batch(&self, max: usize) -> Result<Vec<ScanTask>, AppError> {
        let limit = max.min(self.max_batch_size());
        if limit == 0 {
            return Ok(Vec::new());
        }

        let messages = self
            .primary
            .receive(limit, self.config.visibility_timeout, self.config.wait_time)
            .await?;

        let mut tasks = Vec::with_capacity(messages.len());
        for message in messages.into_iter().take(limit) {
            let decoded = serde_json::from_str::<ScanTask>(&message.body);

            if let Err(ref e) = decoded {
                tracing::error!(error = %e, "Undecodable scan task; moving to dead-letter queue");
                if let Err(dl_err) = self
                    .dead_letter_malformed(message.body.clone(), e.to_string())
                    .await
                {
                    tracing::error!(
                        error = %dl_err,
                        queue = self.dead_letter.name(),
                        body = %message.body,
                        "Failed to dead-letter undecodable message; leaving it for redelivery"
                    );
                    continue;
                }
            }

            if let Err(e) = self.primary.delete(&message.receipt_handle).await {
                tracing::warn!(
                    error = %e,
                    queue = self.primary.name(),
                    "Failed to delete received message; leaving it for redelivery"
                );
                continue;
            }

            if let Ok(task) = decoded {
                tasks.push(task);
            }
        }

        Ok(tasks)
    }

    /// Re-enqueue a copy of `task` with the retry counter advanced.
    pub async fn retry(&self, task: &ScanTask) -> Result<ScanTask, AppError> {
        let next = task.next_attempt();
        self.enqueue(&next).await?;
        tracing::info!(
            tenant_id = %next.tenant_id,
            document_id = %next.document_id,
            retry_count = next.retry_count,
            "Scan task scheduled for retry"
        );
        Ok(next)
    }

    /// Record `task` as abandoned on the dead-letter channel.
    pub async fn dead_letter(&self, task: &ScanTask, reason: &str) -> Result<(), AppError> {
        let record = DeadLetterRecord {
            task: task.clone(),
            reason: reason.to_string(),
            failed_at: Utc::now(),
        };
        let body = serde_json::to_string(&record).map_err(QueueError::from)?;
        self.dead_letter.send(&body).await?;
        tracing::warn!(
            tenant_id = %task.tenant_id,
            document_id = %task.document_id,
            retry_count = task.retry_count,
            reason = %reason,
            "Scan task dead-lettered"
        );
        Ok(())
    }

    async fn dead_letter_malformed(&self, body: String, reason: String) -> Result<(), AppError> {
        let record = MalformedMessageRecord {
            body,
            reason,
            failed_at: Utc::now(),
        };
        let body = serde_json::to_string(&record).map_err(QueueError::from)?;
        self.dead_letter.send(&body).await?;
        Ok(())
    }

    /// Messages are deleted at dequeue, so there is nothing left to acknowledge.
    pub async fn complete(&self, _task: &ScanTask) -> Result<(), AppError> {
        Ok(())
    }

    /// Drop every message on the primary queue.
    pub async fn purge(&self) -> Result<(), AppError> {
        self.primary.purge().await?;
        tracing::warn!(queue = self.primary.name(), "Scan queue purged");
        Ok(())
    }

    /// Entry point for the document status owner: schedule the first scan of
    /// an uploaded version.
    pub async fn queue_for_scanning(
        &self,
        document_id: &str,
        version_id: &str,
        tenant_id: &str,
        storage_path: &str,
    ) -> Result<ScanTask, AppError> {
        let task = ScanTask::new(document_id, version_id, tenant_id, storage_path);
        self.enqueue(&task).await?;
        Ok(task)
    }
}
