//! Build the worker's collaborators from configuration.

use crate::directory::{DocumentDirectory, NoopDirectory};
use crate::events::{BroadcastPublisher, CompositePublisher, EventError, EventPublisher};
use crate::queue::{InMemoryQueueBackend, QueueBackend, QueueError, ScanTaskQueue, ScanTaskQueueConfig};
use docsafe_core::{AppError, Config, QueueBackendKind, ScanEngine};
use std::sync::Arc;

/// Create the scan queue with its dead-letter channel based on configuration
pub async fn create_queue(config: &Config) -> Result<ScanTaskQueue, QueueError> {
    let queue_config = ScanTaskQueueConfig::from(&config.queue);

    let (primary, dead_letter): (Arc<dyn QueueBackend>, Arc<dyn QueueBackend>) =
        match config.queue.backend {
            QueueBackendKind::Memory => {
                tracing::warn!("Using in-memory scan queue; tasks are lost on restart");
                (
                    Arc::new(InMemoryQueueBackend::new()),
                    Arc::new(InMemoryQueueBackend::new()),
                )
            }

            #[cfg(feature = "queue-sqs")]
            QueueBackendKind::Sqs => {
                use crate::queue::SqsQueueBackend;

                let queue_url = config.queue.sqs_queue_url.clone().ok_or_else(|| {
                    QueueError::ConfigError("SQS_SCAN_QUEUE_URL not configured".to_string())
                })?;
                let dlq_url = config.queue.sqs_dead_letter_queue_url.clone().ok_or_else(|| {
                    QueueError::ConfigError("SQS_DEAD_LETTER_QUEUE_URL not configured".to_string())
                })?;
                let region = config
                    .aws_region
                    .clone()
                    .or_else(|| config.s3_region().map(String::from))
                    .ok_or_else(|| QueueError::ConfigError("AWS_REGION not configured".to_string()))?;
                let endpoint = config.queue.sqs_endpoint.clone();

                (
                    Arc::new(SqsQueueBackend::new(queue_url, region.clone(), endpoint.clone()).await?),
                    Arc::new(SqsQueueBackend::new(dlq_url, region, endpoint).await?),
                )
            }

            #[cfg(not(feature = "queue-sqs"))]
            QueueBackendKind::Sqs => {
                return Err(QueueError::ConfigError(
                    "SQS queue backend not available (queue-sqs feature not enabled)".to_string(),
                ))
            }
        };

    Ok(ScanTaskQueue::new(primary, dead_letter, queue_config))
}

/// Create the scanning engine
pub fn create_scanner(config: &Config) -> Arc<dyn ScanEngine> {
    Arc::new(docsafe_services::ClamAVService::with_limits(
        config.scanner.clamav_host.clone(),
        config.scanner.clamav_port,
        config.scanner.timeout_secs,
        config.scanner.max_scan_bytes,
    ))
}

/// Create the event publisher: the in-process broadcast, plus the webhook when configured.
pub fn create_publisher(
    config: &Config,
    broadcast: BroadcastPublisher,
) -> Result<Arc<dyn EventPublisher>, EventError> {
    let mut publishers: Vec<Arc<dyn EventPublisher>> = vec![Arc::new(broadcast)];

    if let Some(ref url) = config.webhook.url {
        #[cfg(feature = "webhook")]
        {
            use crate::events::{WebhookPublisher, WebhookPublisherConfig};
            publishers.push(Arc::new(WebhookPublisher::new(WebhookPublisherConfig {
                url: url.clone(),
                signing_secret: config.webhook.signing_secret.clone(),
                timeout_seconds: config.webhook.timeout_secs,
            })?));
            tracing::info!(url = %url, "Webhook event publisher enabled");
        }

        #[cfg(not(feature = "webhook"))]
        tracing::warn!(url = %url, "EVENT_WEBHOOK_URL set but webhook feature not enabled");
    }

    Ok(Arc::new(CompositePublisher::new(publishers)))
}

/// Create the document directory the worker consults for status and folder.
///
/// Without `DOCUMENT_DIRECTORY_URL` the worker cannot see folders or terminal
/// statuses: every document lands in the default folder and no task is skipped.
pub fn create_directory(config: &Config) -> Result<Arc<dyn DocumentDirectory>, AppError> {
    let Some(ref url) = config.directory.url else {
        tracing::warn!(
            "DOCUMENT_DIRECTORY_URL not set; folder and status lookups disabled, documents go to the default folder"
        );
        return Ok(Arc::new(NoopDirectory));
    };

    #[cfg(feature = "directory-http")]
    {
        use crate::directory::{HttpDirectoryConfig, HttpDocumentDirectory};
        let directory = HttpDocumentDirectory::new(HttpDirectoryConfig {
            base_url: url.clone(),
            auth_token: config.directory.auth_token.clone(),
            timeout_seconds: config.directory.timeout_secs,
        })?;
        tracing::info!(url = %url, "Document directory enabled");
        Ok(Arc::new(directory))
    }

    #[cfg(not(feature = "directory-http"))]
    Err(AppError::validation(format!(
        "DOCUMENT_DIRECTORY_URL {} set but directory-http feature not enabled",
        url
    )))
}
