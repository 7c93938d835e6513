//! Object backend abstraction
//!
//! This module defines the primitive operations every storage backend must
//! provide. Tenant checks, key layout and move semantics live one level up in
//! [`crate::service::DocumentStorage`].

use crate::keys::BucketClass;
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use docsafe_core::AppError;
use futures::Stream;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Copy failed: {0}")]
    CopyFailed(String),

    #[error("Presign failed: {0}")]
    PresignFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidKey(msg) => AppError::Validation(msg),
            StorageError::NotFound(key) => AppError::NotFound(key),
            StorageError::ConfigError(msg) => AppError::Internal(msg),
            other => AppError::dependency("storage", other),
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Chunked object content.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// Upload source handed to [`ObjectBackend::put_stream`].
pub type BoxedReader = Pin<Box<dyn AsyncRead + Send + Unpin>>;

/// Object backend primitives
///
/// Keys are full storage paths (`temp/t1/d1`, `t1/f1/d1/v1`, ...). The bucket
/// class is passed alongside so backends can apply per-area settings such as
/// encryption keys without re-parsing the key.
#[async_trait]
pub trait ObjectBackend: Send + Sync {
    /// Stream `reader` into `key` until EOF and return the number of bytes written.
    ///
    /// Implementations must not buffer the whole payload in memory.
    async fn put_stream(
        &self,
        class: BucketClass,
        key: &str,
        content_type: &str,
        content_length: Option<u64>,
        reader: BoxedReader,
    ) -> StorageResult<u64>;

    /// Server-side copy; content never passes through the caller.
    async fn copy(
        &self,
        from_class: BucketClass,
        from_key: &str,
        to_class: BucketClass,
        to_key: &str,
    ) -> StorageResult<()>;

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete(&self, class: BucketClass, key: &str) -> StorageResult<()>;

    /// Open an object as a stream of chunks.
    async fn get_stream(&self, class: BucketClass, key: &str) -> StorageResult<ByteStream>;

    /// Check if an object exists
    async fn exists(&self, class: BucketClass, key: &str) -> StorageResult<bool>;

    /// Generate a time-boxed GET URL whose response forces a download with
    /// the given `Content-Disposition` header value.
    async fn presign_get(
        &self,
        class: BucketClass,
        key: &str,
        content_disposition: &str,
        expires_in: Duration,
    ) -> StorageResult<String>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_maps_to_taxonomy() {
        assert!(AppError::from(StorageError::InvalidKey("..".into())).is_validation());
        assert!(AppError::from(StorageError::NotFound("temp/t1/d1".into())).is_not_found());
        assert!(AppError::from(StorageError::UploadFailed("reset".into())).is_dependency());
        assert!(AppError::from(StorageError::CopyFailed("503".into())).is_dependency());
        assert!(!AppError::from(StorageError::ConfigError("bucket".into())).is_dependency());
    }
}
