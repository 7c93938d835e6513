//! Scan worker: drains the scan queue and drives each task to a disposition.
//!
//! Per task: fetch the temporary object, scan it, then
//! - `Clean`: move to permanent storage and publish `document.processed`;
//! - `Infected`: move to quarantine and publish `document.quarantined`;
//! - `Error`: retry while `retryCount < 3`, otherwise dead-letter and publish
//!   `document.scan_failed`.
//!
//! Fetch failures and failed storage moves take the `Error` path. Tasks are
//! handled strictly one after another, and a worker instance runs at most one
//! drain at a time.

use crate::directory::DocumentDirectory;
use crate::events::EventPublisher;
use crate::metrics::ScanMetrics;
use crate::queue::ScanTaskQueue;
use chrono::Utc;
use docsafe_core::constants::DEFAULT_FOLDER_ID;
use docsafe_core::models::{DocumentEvent, DocumentStatus, ScanTask};
use docsafe_core::{AppError, ContentStream, ErrorMetadata, ScanEngine, ScanVerdict};
use docsafe_storage::DocumentStorage;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// How a single task was disposed of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Available { path: String },
    Quarantined { path: String },
    Retried { retry_count: u32 },
    DeadLettered { attempts: u32 },
    /// The version already had a terminal status; nothing was done.
    Skipped { status: DocumentStatus },
}

/// Why a drain stopped early. Both variants carry the number of tasks fully
/// handled before stopping.
#[derive(Debug, Error)]
pub enum DrainError {
    #[error("drain cancelled after {processed} task(s)")]
    Cancelled { processed: usize },

    #[error("drain stopped after {processed} task(s): {source}")]
    Queue {
        processed: usize,
        #[source]
        source: AppError,
    },
}

impl DrainError {
    pub fn processed(&self) -> usize {
        match self {
            DrainError::Cancelled { processed } | DrainError::Queue { processed, .. } => *processed,
        }
    }
}

impl From<DrainError> for AppError {
    fn from(err: DrainError) -> Self {
        match err {
            DrainError::Cancelled { .. } => AppError::Cancelled,
            DrainError::Queue { source, .. } => source,
        }
    }
}

/// Clears the running flag when a drain ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ScanWorker {
    queue: ScanTaskQueue,
    storage: DocumentStorage,
    scanner: Arc<dyn ScanEngine>,
    publisher: Arc<dyn EventPublisher>,
    directory: Arc<dyn DocumentDirectory>,
    metrics: Arc<ScanMetrics>,
    running: AtomicBool,
}

impl ScanWorker {
    pub fn new(
        queue: ScanTaskQueue,
        storage: DocumentStorage,
        scanner: Arc<dyn ScanEngine>,
        publisher: Arc<dyn EventPublisher>,
        directory: Arc<dyn DocumentDirectory>,
        metrics: Arc<ScanMetrics>,
    ) -> Self {
        Self {
            queue,
            storage,
            scanner,
            publisher,
            directory,
            metrics,
            running: AtomicBool::new(false),
        }
    }

    pub fn metrics(&self) -> &Arc<ScanMetrics> {
        &self.metrics
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn try_begin(&self) -> Option<RunningGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunningGuard(&self.running))
    }

    /// Process tasks until the queue is empty.
    ///
    /// Returns `Ok(0)` immediately if another drain on this worker is in progress.
    pub async fn drain(&self, cancel: &CancellationToken) -> Result<usize, DrainError> {
        let Some(_guard) = self.try_begin() else {
            tracing::debug!("Drain already in progress; skipping");
            return Ok(0);
        };
        self.drain_inner(None, cancel).await
    }

    /// Process at most `max` tasks, stopping early when the queue is empty.
    ///
    /// Returns `Ok(0)` immediately if another drain on this worker is in progress.
    pub async fn drain_batch(
        &self,
        max: usize,
        cancel: &CancellationToken,
    ) -> Result<usize, DrainError> {
        let Some(_guard) = self.try_begin() else {
            tracing::debug!("Drain already in progress; skipping");
            return Ok(0);
        };
        self.drain_inner(Some(max), cancel).await
    }

    async fn drain_inner(
        &self,
        max: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<usize, DrainError> {
        let start = Instant::now();
        let mut processed = 0usize;

        loop {
            let remaining = match max {
                Some(max) if processed >= max => break,
                Some(max) => max - processed,
                None => usize::MAX,
            };
            if cancel.is_cancelled() {
                return Err(DrainError::Cancelled { processed });
            }

            let fetch = remaining.min(self.queue.max_batch_size());
            let tasks = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DrainError::Cancelled { processed }),
                result = self.queue.dequeue_batch(fetch) => {
                    result.map_err(|source| DrainError::Queue { processed, source })?
                }
            };
            if tasks.is_empty() {
                break;
            }

            let mut pending = tasks.into_iter();
            while let Some(task) = pending.next() {
                match self.process_task(&task, cancel).await {
                    Ok(_) => processed += 1,
                    Err(AppError::Cancelled) => {
                        self.requeue(pending).await;
                        return Err(DrainError::Cancelled { processed });
                    }
                    Err(source) => {
                        self.requeue(pending).await;
                        return Err(DrainError::Queue { processed, source });
                    }
                }
            }
        }

        if processed > 0 {
            tracing::info!(
                processed,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Scan drain completed"
            );
        }
        Ok(processed)
    }

    /// Put dequeued but untouched tasks back, unchanged.
    async fn requeue(&self, tasks: impl Iterator<Item = ScanTask>) {
        for task in tasks {
            if let Err(e) = self.queue.enqueue(&task).await {
                tracing::error!(
                    error = %e,
                    tenant_id = %task.tenant_id,
                    document_id = %task.document_id,
                    "Failed to return unprocessed task to the queue"
                );
            }
        }
    }

    /// Drive one task to its disposition.
    ///
    /// Returns `AppError::Cancelled` when cancelled before the storage move;
    /// the task has then been returned to the queue unchanged. Other errors
    /// mean the queue could not record a retry or dead-letter.
    #[tracing::instrument(skip(self, task, cancel), fields(tenant_id = %task.tenant_id, document_id = %task.document_id, version_id = %task.version_id, retry_count = task.retry_count))]
    pub async fn process_task(
        &self,
        task: &ScanTask,
        cancel: &CancellationToken,
    ) -> Result<TaskOutcome, AppError> {
        match self
            .directory
            .status(&task.tenant_id, &task.document_id, &task.version_id)
            .await
        {
            Ok(Some(status)) if status.is_terminal() => {
                tracing::info!(status = %status, "Document version already final; skipping task");
                self.metrics.record_skip();
                self.queue.complete(task).await?;
                return Ok(TaskOutcome::Skipped { status });
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Document status lookup failed; processing task anyway");
            }
        }

        let start = Instant::now();
        let verdict = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.requeue(std::iter::once(task.clone())).await;
                return Err(AppError::Cancelled);
            }
            verdict = self.fetch_and_scan(task) => verdict,
        };
        self.metrics.record_scan(&verdict, start.elapsed());

        match verdict {
            ScanVerdict::Clean => {
                let folder_id = self.folder_for(task).await;
                match self
                    .storage
                    .store_permanent(
                        &task.tenant_id,
                        &task.document_id,
                        &task.version_id,
                        &folder_id,
                        &task.storage_path,
                    )
                    .await
                {
                    Ok(path) => {
                        tracing::info!(path = %path, "Document scanned clean and stored");
                        self.publish(DocumentEvent::Processed {
                            tenant_id: task.tenant_id.clone(),
                            document_id: task.document_id.clone(),
                            version_id: task.version_id.clone(),
                            storage_path: path.clone(),
                            occurred_at: Utc::now(),
                        })
                        .await;
                        self.queue.complete(task).await?;
                        Ok(TaskOutcome::Available { path })
                    }
                    Err(e) => self.handle_move_failure(task, "permanent storage", e).await,
                }
            }
            ScanVerdict::Infected(details) => {
                match self
                    .storage
                    .move_to_quarantine(&task.tenant_id, &task.document_id, &task.storage_path)
                    .await
                {
                    Ok(path) => {
                        tracing::warn!(path = %path, details = %details, "Document quarantined");
                        self.publish(DocumentEvent::Quarantined {
                            tenant_id: task.tenant_id.clone(),
                            document_id: task.document_id.clone(),
                            version_id: task.version_id.clone(),
                            details,
                            quarantine_path: path.clone(),
                            occurred_at: Utc::now(),
                        })
                        .await;
                        self.queue.complete(task).await?;
                        Ok(TaskOutcome::Quarantined { path })
                    }
                    Err(e) => self.handle_move_failure(task, "quarantine", e).await,
                }
            }
            ScanVerdict::Error(error) => self.handle_failure(task, error).await,
        }
    }

    async fn fetch_and_scan(&self, task: &ScanTask) -> ScanVerdict {
        let stream = match self
            .storage
            .get_document(&task.tenant_id, &task.storage_path)
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch document for scanning");
                return ScanVerdict::Error(format!("fetch failed: {}", e));
            }
        };

        let content: ContentStream = Box::pin(stream.map(|chunk| chunk.map_err(std::io::Error::other)));
        let verdict = self.scanner.scan_stream(content).await;
        tracing::debug!(engine = self.scanner.name(), verdict = verdict.label(), "Scan finished");
        verdict
    }

    async fn folder_for(&self, task: &ScanTask) -> String {
        match self
            .directory
            .folder_id(&task.tenant_id, &task.document_id, &task.version_id)
            .await
        {
            Ok(Some(folder)) => folder,
            Ok(None) => DEFAULT_FOLDER_ID.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "Folder lookup failed; using default folder");
                DEFAULT_FOLDER_ID.to_string()
            }
        }
    }

    async fn handle_move_failure(
        &self,
        task: &ScanTask,
        destination: &str,
        error: AppError,
    ) -> Result<TaskOutcome, AppError> {
        let reason = format!("move to {} failed: {}", destination, error);
        if error.is_validation() {
            // Retrying cannot fix a malformed task.
            tracing::error!(error = %error, "Task rejected by storage; dead-lettering without retry");
            return self.abandon(task, reason).await;
        }
        tracing::warn!(
            error = %error,
            error_code = error.error_code(),
            recoverable = error.is_recoverable(),
            "Storage move failed"
        );
        self.handle_failure(task, reason).await
    }

    async fn handle_failure(&self, task: &ScanTask, error: String) -> Result<TaskOutcome, AppError> {
        if task.retries_exhausted() {
            return self.abandon(task, error).await;
        }
        match self.queue.retry(task).await {
            Ok(next) => Ok(TaskOutcome::Retried {
                retry_count: next.retry_count,
            }),
            Err(retry_err) => {
                // The task left the queue at dequeue; the dead-letter channel is its last record.
                tracing::error!(error = %retry_err, "Failed to re-enqueue task for retry; dead-lettering");
                self.abandon(task, format!("retry failed: {}; last error: {}", retry_err, error))
                    .await
            }
        }
    }

    async fn abandon(&self, task: &ScanTask, error: String) -> Result<TaskOutcome, AppError> {
        if let Err(e) = self.queue.dead_letter(task, &error).await {
            tracing::error!(
                error = %e,
                reason = %error,
                task = %serde_json::to_string(task).unwrap_or_else(|_| format!("{:?}", task)),
                "Failed to dead-letter task; task is lost from the queue"
            );
            return Err(e);
        }
        self.publish(DocumentEvent::ScanFailed {
            tenant_id: task.tenant_id.clone(),
            document_id: task.document_id.clone(),
            version_id: task.version_id.clone(),
            error,
            attempts: task.retry_count,
            occurred_at: Utc::now(),
        })
        .await;
        Ok(TaskOutcome::DeadLettered {
            attempts: task.retry_count,
        })
    }

    async fn publish(&self, event: DocumentEvent) {
        if let Err(e) = self.publisher.publish(&event).await {
            tracing::error!(
                error = %e,
                event = event.event_type(),
                tenant_id = %event.tenant_id(),
                document_id = %event.document_id(),
                "Failed to publish document event"
            );
        }
    }

    /// Drain up to `batch_size` tasks every `interval` until `cancel` fires.
    pub async fn run(&self, interval: Duration, batch_size: usize, cancel: CancellationToken) {
        tracing::info!(
            interval_ms = interval.as_millis() as u64,
            batch_size,
            engine = self.scanner.name(),
            "Scan worker started"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match self.drain_batch(batch_size, &cancel).await {
                        Ok(_) => {}
                        Err(DrainError::Cancelled { processed }) => {
                            tracing::info!(processed, "Scan drain cancelled");
                            break;
                        }
                        Err(e) => {
                            tracing::error!(error = %e, processed = e.processed(), "Scan drain failed");
                        }
                    }
                }
            }
        }

        let snapshot = self.metrics.snapshot();
        tracing::info!(
            scanned = snapshot.scanned,
            clean = snapshot.clean,
            infected = snapshot.infected,
            error = snapshot.error,
            skipped = snapshot.skipped,
            "Scan worker stopped"
        );
    }
}
