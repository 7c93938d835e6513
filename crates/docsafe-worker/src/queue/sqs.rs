use super::{QueueBackend, QueueError, ReceivedMessage};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sqs::Client;
use docsafe_core::constants::MAX_DEQUEUE_BATCH;
use std::time::Duration;

/// Longest long-poll SQS accepts.
const MAX_WAIT_TIME_SECS: u64 = 20;

/// Amazon SQS queue backend
///
/// Uses standard receive/delete. `ApproximateReceiveCount` is deliberately
/// not requested: the retry budget is carried in the task body.
#[derive(Clone)]
pub struct SqsQueueBackend {
    client: Client,
    queue_url: String,
}

impl SqsQueueBackend {
    /// Create a new SqsQueueBackend
    ///
    /// # Arguments
    /// * `queue_url` - Full SQS queue URL
    /// * `region` - AWS region
    /// * `endpoint_url` - Optional custom endpoint (e.g., LocalStack)
    pub async fn new(
        queue_url: String,
        region: String,
        endpoint_url: Option<String>,
    ) -> Result<Self, QueueError> {
        if queue_url.trim().is_empty() {
            return Err(QueueError::ConfigError("SQS queue URL is empty".to_string()));
        }

        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(region))
            .load()
            .await;

        let mut sqs_config = aws_sdk_sqs::config::Builder::from(&config);
        if let Some(endpoint) = endpoint_url {
            sqs_config = sqs_config.endpoint_url(endpoint);
        }

        Ok(Self::from_client(Client::from_conf(sqs_config.build()), queue_url))
    }

    pub fn from_client(client: Client, queue_url: String) -> Self {
        Self { client, queue_url }
    }
}

#[async_trait]
impl QueueBackend for SqsQueueBackend {
    async fn send(&self, body: &str) -> Result<(), QueueError> {
        self.client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, queue_url = %self.queue_url, "SQS send failed");
                QueueError::SendFailed(e.to_string())
            })?;
        Ok(())
    }

    async fn receive(
        &self,
        max_messages: usize,
        visibility_timeout: Duration,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let max_messages = max_messages.clamp(1, MAX_DEQUEUE_BATCH) as i32;
        let wait_secs = wait.as_secs().min(MAX_WAIT_TIME_SECS) as i32;
        let visibility_secs = visibility_timeout.as_secs().min(i32::MAX as u64) as i32;

        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max_messages)
            .visibility_timeout(visibility_secs)
            .wait_time_seconds(wait_secs)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, queue_url = %self.queue_url, "SQS receive failed");
                QueueError::ReceiveFailed(e.to_string())
            })?;

        let messages = output
            .messages()
            .iter()
            .filter_map(|message| {
                let receipt_handle = message.receipt_handle()?.to_string();
                let body = message.body().unwrap_or_default().to_string();
                Some(ReceivedMessage {
                    body,
                    receipt_handle,
                })
            })
            .collect();

        Ok(messages)
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| QueueError::DeleteFailed(e.to_string()))?;
        Ok(())
    }

    async fn purge(&self) -> Result<(), QueueError> {
        self.client
            .purge_queue()
            .queue_url(&self.queue_url)
            .send()
            .await
            .map_err(|e| QueueError::PurgeFailed(e.to_string()))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sqs"
    }
}
