#[cfg(feature = "storage-local")]
use crate::LocalStorage;
#[cfg(feature = "storage-s3")]
use crate::{S3AreaEncryption, S3Storage};
use crate::{ObjectBackend, StorageBackend, StorageError, StorageResult};
use docsafe_core::Config;
use std::sync::Arc;

/// Create an object backend based on configuration
pub async fn create_backend(config: &Config) -> StorageResult<Arc<dyn ObjectBackend>> {
    match config.storage.backend {
        #[cfg(feature = "storage-s3")]
        StorageBackend::S3 => {
            let bucket = config
                .storage
                .s3_bucket
                .clone()
                .ok_or_else(|| StorageError::ConfigError("S3_BUCKET not configured".to_string()))?;
            let region = config.s3_region().map(String::from).ok_or_else(|| {
                StorageError::ConfigError("S3_REGION or AWS_REGION not configured".to_string())
            })?;
            let encryption = S3AreaEncryption {
                temporary_kms_key_id: config.storage.temp_kms_key_id.clone(),
                permanent_kms_key_id: config.storage.permanent_kms_key_id.clone(),
                quarantine_kms_key_id: config.storage.quarantine_kms_key_id.clone(),
            };

            let storage =
                S3Storage::new(bucket, region, config.storage.s3_endpoint.clone(), encryption)
                    .await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageBackend::S3 => Err(StorageError::ConfigError(
            "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let base_path = config.storage.local_storage_path.clone().ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_PATH not configured".to_string())
            })?;
            let base_url = config.storage.local_storage_base_url.clone().ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_BASE_URL not configured".to_string())
            })?;
            let secret = match config.storage.local_signing_secret.clone() {
                Some(secret) => secret,
                None => {
                    tracing::warn!(
                        "LOCAL_STORAGE_SIGNING_SECRET not set; download links use a development secret"
                    );
                    "docsafe-development-secret".to_string()
                }
            };

            let storage = LocalStorage::new(base_path, base_url, secret.into_bytes()).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),
    }
}

#[cfg(all(test, feature = "storage-local"))]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_create_local_backend_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let vars: HashMap<&str, String> = HashMap::from([
            ("STORAGE_BACKEND", "local".to_string()),
            ("LOCAL_STORAGE_PATH", dir.path().display().to_string()),
            ("LOCAL_STORAGE_BASE_URL", "http://localhost:4000/files".to_string()),
            ("QUEUE_BACKEND", "memory".to_string()),
        ]);
        let config = Config::from_lookup(|key| vars.get(key).cloned()).unwrap();

        let backend = create_backend(&config).await.unwrap();
        assert_eq!(backend.backend_type(), StorageBackend::Local);
    }

    #[tokio::test]
    async fn test_local_backend_requires_path() {
        let vars: HashMap<&str, String> =
            HashMap::from([("STORAGE_BACKEND", "local".to_string())]);
        let config = Config::from_lookup(|key| vars.get(key).cloned()).unwrap();

        let result = create_backend(&config).await;
        assert!(matches!(result, Err(StorageError::ConfigError(_))));
    }
}
