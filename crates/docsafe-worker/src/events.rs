//! Outcome event publication.
//!
//! Publishing happens after the storage move has succeeded. A failed publish
//! is logged by the worker and never rolls the disposition back.

use async_trait::async_trait;
use docsafe_core::models::DocumentEvent;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("Event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Event delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DocumentEvent) -> Result<(), EventError>;
}

/// In-process fan-out over a tokio broadcast channel.
#[derive(Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<DocumentEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DocumentEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, event: &DocumentEvent) -> Result<(), EventError> {
        if self.sender.send(event.clone()).is_err() {
            tracing::debug!(event = event.event_type(), "No subscribers for document event");
        }
        Ok(())
    }
}

/// Publishes to every inner publisher; fails if any of them failed.
#[derive(Clone, Default)]
pub struct CompositePublisher {
    publishers: Vec<Arc<dyn EventPublisher>>,
}

impl CompositePublisher {
    pub fn new(publishers: Vec<Arc<dyn EventPublisher>>) -> Self {
        Self { publishers }
    }
}

#[async_trait]
impl EventPublisher for CompositePublisher {
    async fn publish(&self, event: &DocumentEvent) -> Result<(), EventError> {
        let mut first_error = None;
        for publisher in &self.publishers {
            if let Err(e) = publisher.publish(event).await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(feature = "webhook")]
pub use webhook::{WebhookPublisher, WebhookPublisherConfig};

#[cfg(feature = "webhook")]
mod webhook {
    use super::{EventError, EventPublisher};
    use async_trait::async_trait;
    use docsafe_core::models::DocumentEvent;
    use hmac::{Hmac, Mac};
    use reqwest::Client;
    use sha2::Sha256;
    use std::time::Duration;
    use subtle::ConstantTimeEq;

    type HmacSha256 = Hmac<Sha256>;

    pub const SIGNATURE_HEADER: &str = "X-Docsafe-Signature";
    pub const EVENT_HEADER: &str = "X-Docsafe-Event";

    #[derive(Clone, Debug)]
    pub struct WebhookPublisherConfig {
        pub url: String,
        pub signing_secret: Option<String>,
        pub timeout_seconds: u64,
    }

    /// POSTs each event as JSON to a single endpoint.
    ///
    /// With a signing secret, the body's HMAC-SHA256 is sent as
    /// `X-Docsafe-Signature: v1=<hex>`.
    #[derive(Clone)]
    pub struct WebhookPublisher {
        http_client: Client,
        config: WebhookPublisherConfig,
    }

    impl WebhookPublisher {
        pub fn new(config: WebhookPublisherConfig) -> Result<Self, EventError> {
            let http_client = Client::builder()
                .timeout(Duration::from_secs(config.timeout_seconds))
                .pool_idle_timeout(Duration::from_secs(90))
                .build()
                .map_err(|e| EventError::Delivery(format!("Failed to build HTTP client: {}", e)))?;
            Ok(Self {
                http_client,
                config,
            })
        }

        /// Sign payload with HMAC-SHA256
        pub fn sign_payload(body: &str, secret: &str) -> Result<String, EventError> {
            let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
                .map_err(|e| EventError::Delivery(format!("Invalid signing secret: {}", e)))?;
            mac.update(body.as_bytes());
            Ok(hex::encode(mac.finalize().into_bytes()))
        }

        /// Verify a `v1=<hex>` signature header value against `body`.
        pub fn verify_signature(body: &str, secret: &str, header_value: &str) -> bool {
            let Some(signature) = header_value.strip_prefix("v1=") else {
                return false;
            };
            match Self::sign_payload(body, secret) {
                Ok(expected) => expected.as_bytes().ct_eq(signature.as_bytes()).into(),
                Err(_) => false,
            }
        }
    }

    #[async_trait]
    impl EventPublisher for WebhookPublisher {
        async fn publish(&self, event: &DocumentEvent) -> Result<(), EventError> {
            let start = std::time::Instant::now();
            let body = serde_json::to_string(event)?;

            let mut request = self
                .http_client
                .post(&self.config.url)
                .header("Content-Type", "application/json")
                .header("User-Agent", "Docsafe-Webhook/1.0")
                .header(EVENT_HEADER, event.event_type());

            if let Some(ref secret) = self.config.signing_secret {
                let signature = Self::sign_payload(&body, secret)?;
                request = request.header(SIGNATURE_HEADER, format!("v1={}", signature));
            }

            let response = request.body(body).send().await.map_err(|e| {
                tracing::error!(error = %e, url = %self.config.url, "Webhook delivery failed");
                EventError::Delivery(e.to_string())
            })?;

            let status = response.status();
            if !status.is_success() {
                tracing::error!(
                    status = status.as_u16(),
                    url = %self.config.url,
                    event = event.event_type(),
                    "Webhook endpoint rejected event"
                );
                return Err(EventError::Delivery(format!(
                    "endpoint returned status {}",
                    status
                )));
            }

            tracing::debug!(
                event = event.event_type(),
                tenant_id = %event.tenant_id(),
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Webhook delivered"
            );
            Ok(())
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event() -> DocumentEvent {
        DocumentEvent::Processed {
            tenant_id: "t1".into(),
            document_id: "d1".into(),
            version_id: "v1".into(),
            storage_path: "t1/root/d1/v1".into(),
            occurred_at: Utc::now(),
        }
    }

    struct FailingPublisher;

    #[async_trait]
    impl EventPublisher for FailingPublisher {
        async fn publish(&self, _event: &DocumentEvent) -> Result<(), EventError> {
            Err(EventError::Delivery("down".into()))
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_subscribers() {
        let publisher = BroadcastPublisher::new(4);
        let mut rx = publisher.subscribe();
        let sent = event();
        publisher.publish(&sent).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), sent);
    }

    #[tokio::test]
    async fn broadcast_without_subscribers_is_ok() {
        let publisher = BroadcastPublisher::new(4);
        assert!(publisher.publish(&event()).await.is_ok());
    }

    #[tokio::test]
    async fn composite_delivers_to_all_and_reports_failure() {
        let broadcast = BroadcastPublisher::new(4);
        let mut rx = broadcast.subscribe();
        let composite = CompositePublisher::new(vec![
            Arc::new(FailingPublisher),
            Arc::new(broadcast.clone()),
        ]);

        assert!(composite.publish(&event()).await.is_err());
        assert_eq!(rx.recv().await.unwrap().event_type(), "document.processed");
    }
}
