//! Document directory: what the worker may ask about a document version.
//!
//! The authoritative metadata store is an external collaborator. The worker
//! only needs the version's current status (to skip versions that already
//! reached a terminal status) and its folder (for the permanent key).

use async_trait::async_trait;
use chrono::Utc;
use docsafe_core::models::{DocumentEvent, DocumentStatus, DocumentVersion};
use docsafe_core::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

#[async_trait]
pub trait DocumentDirectory: Send + Sync {
    /// Current status of a version; `None` when the directory does not know it.
    async fn status(
        &self,
        tenant_id: &str,
        document_id: &str,
        version_id: &str,
    ) -> Result<Option<DocumentStatus>, AppError>;

    /// Folder the document belongs to; `None` for documents outside any folder.
    async fn folder_id(
        &self,
        tenant_id: &str,
        document_id: &str,
        version_id: &str,
    ) -> Result<Option<String>, AppError>;
}

type VersionKey = (String, String, String);

fn key(tenant_id: &str, document_id: &str, version_id: &str) -> VersionKey {
    (
        tenant_id.to_string(),
        document_id.to_string(),
        version_id.to_string(),
    )
}

/// In-memory status owner.
///
/// Holds registered versions and applies worker outcome events to them. A
/// version leaves `Processing` at most once; later events for the same
/// version are ignored.
#[derive(Default)]
pub struct DocumentRegistry {
    versions: RwLock<HashMap<VersionKey, DocumentVersion>>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, version: DocumentVersion) {
        let k = key(&version.tenant_id, &version.document_id, &version.version_id);
        self.versions.write().await.insert(k, version);
    }

    pub async fn get(
        &self,
        tenant_id: &str,
        document_id: &str,
        version_id: &str,
    ) -> Option<DocumentVersion> {
        self.versions
            .read()
            .await
            .get(&key(tenant_id, document_id, version_id))
            .cloned()
    }

    /// Apply an outcome event. Returns true when the version changed status.
    pub async fn apply(&self, event: &DocumentEvent) -> bool {
        let mut versions = self.versions.write().await;
        let k = key(event.tenant_id(), event.document_id(), event.version_id());
        let Some(version) = versions.get_mut(&k) else {
            tracing::debug!(
                tenant_id = %event.tenant_id(),
                document_id = %event.document_id(),
                event = event.event_type(),
                "Event for unregistered document version"
            );
            return false;
        };

        if version.status.is_terminal() {
            tracing::warn!(
                tenant_id = %event.tenant_id(),
                document_id = %event.document_id(),
                current = %version.status,
                event = event.event_type(),
                "Ignoring event for document version already in a terminal status"
            );
            return false;
        }

        version.status = event.resulting_status();
        if let Some(path) = event.storage_path() {
            version.storage_path = path.to_string();
        }
        version.updated_at = Utc::now();
        true
    }

    /// Apply every event received on `events` until the channel closes.
    pub fn spawn_listener(
        self: Arc<Self>,
        mut events: broadcast::Receiver<DocumentEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        self.apply(&event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Document registry lagged behind event stream");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

#[async_trait]
impl DocumentDirectory for DocumentRegistry {
    async fn status(
        &self,
        tenant_id: &str,
        document_id: &str,
        version_id: &str,
    ) -> Result<Option<DocumentStatus>, AppError> {
        Ok(self
            .get(tenant_id, document_id, version_id)
            .await
            .map(|v| v.status))
    }

    async fn folder_id(
        &self,
        tenant_id: &str,
        document_id: &str,
        version_id: &str,
    ) -> Result<Option<String>, AppError> {
        Ok(self
            .get(tenant_id, document_id, version_id)
            .await
            .and_then(|v| v.folder_id))
    }
}

/// Directory that knows nothing: every version is processed and lands in the
/// default folder.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDirectory;

#[async_trait]
impl DocumentDirectory for NoopDirectory {
    async fn status(
        &self,
        _tenant_id: &str,
        _document_id: &str,
        _version_id: &str,
    ) -> Result<Option<DocumentStatus>, AppError> {
        Ok(None)
    }

    async fn folder_id(
        &self,
        _tenant_id: &str,
        _document_id: &str,
        _version_id: &str,
    ) -> Result<Option<String>, AppError> {
        Ok(None)
    }
}

#[cfg(feature = "directory-http")]
pub use http::{HttpDirectoryConfig, HttpDocumentDirectory};

#[cfg(feature = "directory-http")]
mod http {
    use super::DocumentDirectory;
    use async_trait::async_trait;
    use docsafe_core::models::DocumentStatus;
    use docsafe_core::AppError;
    use reqwest::{Client, StatusCode, Url};
    use serde::Deserialize;
    use std::time::Duration;

    const SERVICE: &str = "document-directory";

    #[derive(Clone, Debug)]
    pub struct HttpDirectoryConfig {
        pub base_url: String,
        pub auth_token: Option<String>,
        pub timeout_seconds: u64,
    }

    #[derive(Debug, Deserialize)]
    struct VersionRecord {
        status: DocumentStatus,
        #[serde(default)]
        folder_id: Option<String>,
    }

    /// Reads version metadata from the metadata service over HTTP.
    ///
    /// `GET {base}/v1/tenants/{tenant}/documents/{document}/versions/{version}`
    /// answers `{"status": "...", "folder_id": ...}`; 404 means unknown.
    #[derive(Clone)]
    pub struct HttpDocumentDirectory {
        http_client: Client,
        base_url: Url,
        auth_token: Option<String>,
    }

    impl HttpDocumentDirectory {
        pub fn new(config: HttpDirectoryConfig) -> Result<Self, AppError> {
            let base_url = Url::parse(&config.base_url).map_err(|e| {
                AppError::validation(format!("invalid directory URL {}: {}", config.base_url, e))
            })?;
            if base_url.cannot_be_a_base() {
                return Err(AppError::validation(format!(
                    "directory URL {} cannot carry a path",
                    config.base_url
                )));
            }
            let http_client = Client::builder()
                .timeout(Duration::from_secs(config.timeout_seconds))
                .build()
                .map_err(|e| AppError::dependency(SERVICE, format!("Failed to build HTTP client: {}", e)))?;
            Ok(Self {
                http_client,
                base_url,
                auth_token: config.auth_token,
            })
        }

        fn version_url(&self, tenant_id: &str, document_id: &str, version_id: &str) -> Result<Url, AppError> {
            let mut url = self.base_url.clone();
            url.path_segments_mut()
                .map_err(|_| AppError::Internal("directory URL cannot carry a path".to_string()))?
                .pop_if_empty()
                .extend([
                    "v1",
                    "tenants",
                    tenant_id,
                    "documents",
                    document_id,
                    "versions",
                    version_id,
                ]);
            Ok(url)
        }

        async fn version(
            &self,
            tenant_id: &str,
            document_id: &str,
            version_id: &str,
        ) -> Result<Option<VersionRecord>, AppError> {
            let url = self.version_url(tenant_id, document_id, version_id)?;
            let mut request = self.http_client.get(url);
            if let Some(ref token) = self.auth_token {
                request = request.bearer_auth(token);
            }

            let response = request.send().await.map_err(|e| {
                tracing::warn!(error = %e, tenant_id, document_id, "Directory request failed");
                AppError::dependency(SERVICE, e)
            })?;

            match response.status() {
                StatusCode::NOT_FOUND => Ok(None),
                status if status.is_success() => response
                    .json::<VersionRecord>()
                    .await
                    .map(Some)
                    .map_err(|e| AppError::dependency(SERVICE, format!("invalid response: {}", e))),
                status => Err(AppError::dependency(
                    SERVICE,
                    format!("directory returned status {}", status),
                )),
            }
        }
    }

    #[async_trait]
    impl DocumentDirectory for HttpDocumentDirectory {
        async fn status(
            &self,
            tenant_id: &str,
            document_id: &str,
            version_id: &str,
        ) -> Result<Option<DocumentStatus>, AppError> {
            Ok(self
                .version(tenant_id, document_id, version_id)
                .await?
                .map(|v| v.status))
        }

        async fn folder_id(
            &self,
            tenant_id: &str,
            document_id: &str,
            version_id: &str,
        ) -> Result<Option<String>, AppError> {
            Ok(self
                .version(tenant_id, document_id, version_id)
                .await?
                .and_then(|v| v.folder_id))
        }
    }

}
