//! Tenant-scoped document storage
//!
//! [`DocumentStorage`] is the only entry point the pipeline uses for object
//! storage. It validates every identifier and checks the caller's tenant
//! against the tenant embedded in the key before issuing any backend call; a
//! mismatch is reported as `NotFound` so that other tenants' objects are
//! indistinguishable from missing ones.

use crate::archive::{create_zip_archive, ArchiveEntry};
use crate::keys::{
    attachment_disposition, parse_storage_path, permanent_key, quarantine_key, temporary_key,
    validate_tenant_id, BucketClass, ParsedKey,
};
use crate::traits::{BoxedReader, ByteStream, ObjectBackend, StorageError};
use bytes::Bytes;
use docsafe_core::constants::{DEFAULT_PRESIGN_TTL_SECS, MAX_PRESIGN_TTL_SECS};
use docsafe_core::validation::{validate_content_type, validate_identifier};
use docsafe_core::AppError;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct DocumentStorage {
    backend: Arc<dyn ObjectBackend>,
    default_presign_ttl: Duration,
}

impl DocumentStorage {
    pub fn new(backend: Arc<dyn ObjectBackend>) -> Self {
        Self {
            backend,
            default_presign_ttl: Duration::from_secs(DEFAULT_PRESIGN_TTL_SECS),
        }
    }

    /// TTL used by [`Self::get_presigned_url`] when the caller passes none.
    pub fn with_default_presign_ttl(mut self, ttl: Duration) -> Self {
        self.default_presign_ttl = ttl;
        self
    }

    pub fn backend(&self) -> &Arc<dyn ObjectBackend> {
        &self.backend
    }

    /// Parse `path` and make sure it belongs to `tenant_id`.
    fn authorize<'a>(tenant_id: &str, path: &'a str) -> Result<ParsedKey<'a>, AppError> {
        validate_tenant_id(tenant_id)?;
        let parsed = parse_storage_path(path)?;
        if parsed.tenant_id != tenant_id {
            tracing::warn!(
                tenant_id = %tenant_id,
                key_tenant = %parsed.tenant_id,
                "Rejected cross-tenant storage access"
            );
            return Err(AppError::NotFound(path.to_string()));
        }
        Ok(parsed)
    }

    /// Authorize a temporary-area path as the source of a move for `document_id`.
    fn authorize_move_source<'a>(
        tenant_id: &str,
        document_id: &str,
        temp_path: &'a str,
    ) -> Result<ParsedKey<'a>, AppError> {
        validate_identifier("document_id", document_id)?;
        let parsed = Self::authorize(tenant_id, temp_path)?;
        if parsed.class != BucketClass::Temporary {
            return Err(AppError::Validation(format!(
                "expected a temporary storage path, got {}",
                temp_path
            )));
        }
        if parsed.document_id != document_id {
            return Err(AppError::Validation(format!(
                "storage path {} does not belong to document {}",
                temp_path, document_id
            )));
        }
        Ok(parsed)
    }

    /// Stream an upload into the temporary area.
    ///
    /// `size` is the length announced by the uploader. An upload whose byte
    /// count differs is removed again and rejected.
    #[tracing::instrument(skip(self, reader))]
    pub async fn store_temporary(
        &self,
        tenant_id: &str,
        document_id: &str,
        reader: BoxedReader,
        size: u64,
        content_type: &str,
    ) -> Result<String, AppError> {
        validate_tenant_id(tenant_id)?;
        validate_identifier("document_id", document_id)?;
        validate_content_type(content_type)?;

        let key = temporary_key(tenant_id, document_id);
        let written = self
            .backend
            .put_stream(BucketClass::Temporary, &key, content_type, Some(size), reader)
            .await?;

        if written != size {
            if let Err(e) = self.backend.delete(BucketClass::Temporary, &key).await {
                tracing::warn!(error = %e, key = %key, "Failed to remove truncated upload");
            }
            return Err(AppError::Validation(format!(
                "upload size mismatch: expected {} bytes, received {}",
                size, written
            )));
        }

        Ok(key)
    }

    /// Promote a scanned upload into the permanent area.
    #[tracing::instrument(skip(self))]
    pub async fn store_permanent(
        &self,
        tenant_id: &str,
        document_id: &str,
        version_id: &str,
        folder_id: &str,
        temp_path: &str,
    ) -> Result<String, AppError> {
        validate_identifier("version_id", version_id)?;
        validate_identifier("folder_id", folder_id)?;
        Self::authorize_move_source(tenant_id, document_id, temp_path)?;

        let key = permanent_key(tenant_id, folder_id, document_id, version_id);
        self.relocate(temp_path, BucketClass::Permanent, &key).await?;
        Ok(key)
    }

    /// Move an infected upload into the quarantine area.
    #[tracing::instrument(skip(self))]
    pub async fn move_to_quarantine(
        &self,
        tenant_id: &str,
        document_id: &str,
        temp_path: &str,
    ) -> Result<String, AppError> {
        Self::authorize_move_source(tenant_id, document_id, temp_path)?;

        let key = quarantine_key(tenant_id, document_id);
        self.relocate(temp_path, BucketClass::Quarantine, &key).await?;
        Ok(key)
    }

    /// Copy out of the temporary area, then delete the source.
    ///
    /// The delete is best effort: the temporary area's expiry rule removes
    /// anything left behind. A missing source whose destination already
    /// exists is a replayed move and succeeds.
    async fn relocate(
        &self,
        temp_path: &str,
        to_class: BucketClass,
        to_key: &str,
    ) -> Result<(), AppError> {
        match self
            .backend
            .copy(BucketClass::Temporary, temp_path, to_class, to_key)
            .await
        {
            Ok(()) => {}
            Err(StorageError::NotFound(_)) => {
                if self.backend.exists(to_class, to_key).await? {
                    tracing::info!(
                        from_key = %temp_path,
                        to_key = %to_key,
                        "Source already moved; treating as completed"
                    );
                    return Ok(());
                }
                return Err(AppError::NotFound(temp_path.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = self.backend.delete(BucketClass::Temporary, temp_path).await {
            tracing::warn!(
                error = %e,
                key = %temp_path,
                "Failed to delete temporary object after move; expiry will remove it"
            );
        }

        Ok(())
    }

    pub async fn get_document(&self, tenant_id: &str, path: &str) -> Result<ByteStream, AppError> {
        let parsed = Self::authorize(tenant_id, path)?;
        Ok(self.backend.get_stream(parsed.class, path).await?)
    }

    /// Time-boxed download URL forcing `filename` as the saved name.
    ///
    /// `ttl` defaults to the configured presign lifetime and may not exceed 7 days.
    pub async fn get_presigned_url(
        &self,
        tenant_id: &str,
        path: &str,
        filename: &str,
        ttl: Option<Duration>,
    ) -> Result<String, AppError> {
        let parsed = Self::authorize(tenant_id, path)?;
        if filename.trim().is_empty() {
            return Err(AppError::Validation("filename must not be empty".to_string()));
        }
        let ttl = ttl.unwrap_or(self.default_presign_ttl);
        if ttl.is_zero() || ttl.as_secs() > MAX_PRESIGN_TTL_SECS {
            return Err(AppError::Validation(format!(
                "presign ttl must be between 1 and {} seconds",
                MAX_PRESIGN_TTL_SECS
            )));
        }

        let disposition = attachment_disposition(filename);
        Ok(self
            .backend
            .presign_get(parsed.class, path, &disposition, ttl)
            .await?)
    }

    /// Delete a document. Unlike the backend primitive, a missing object is `NotFound`.
    #[tracing::instrument(skip(self))]
    pub async fn delete_document(&self, tenant_id: &str, path: &str) -> Result<(), AppError> {
        let parsed = Self::authorize(tenant_id, path)?;
        if !self.backend.exists(parsed.class, path).await? {
            return Err(AppError::NotFound(path.to_string()));
        }
        self.backend.delete(parsed.class, path).await?;
        Ok(())
    }

    pub async fn exists(&self, tenant_id: &str, path: &str) -> Result<bool, AppError> {
        let parsed = Self::authorize(tenant_id, path)?;
        Ok(self.backend.exists(parsed.class, path).await?)
    }

    /// Bundle several documents into one ZIP archive.
    ///
    /// All paths are checked before the first object is read. If any object
    /// cannot be retrieved the whole call fails.
    #[tracing::instrument(skip(self, paths, filenames), fields(count = paths.len()))]
    pub async fn create_batch_archive(
        &self,
        tenant_id: &str,
        paths: &[String],
        filenames: &[String],
    ) -> Result<ByteStream, AppError> {
        if paths.is_empty() {
            return Err(AppError::Validation(
                "at least one storage path is required".to_string(),
            ));
        }
        if paths.len() != filenames.len() {
            return Err(AppError::Validation(format!(
                "got {} storage paths but {} filenames",
                paths.len(),
                filenames.len()
            )));
        }

        let entries = paths
            .iter()
            .zip(filenames)
            .map(|(path, filename)| {
                let parsed = Self::authorize(tenant_id, path)?;
                Ok(ArchiveEntry {
                    class: parsed.class,
                    key: path.clone(),
                    filename: filename.clone(),
                })
            })
            .collect::<Result<Vec<_>, AppError>>()?;

        let archive = create_zip_archive(self.backend.as_ref(), &entries).await?;
        tracing::info!(
            entries = entries.len(),
            size_bytes = archive.len(),
            "Batch archive created"
        );

        let chunk: Result<Bytes, StorageError> = Ok(Bytes::from(archive));
        Ok(Box::pin(futures::stream::iter(std::iter::once(chunk))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::StorageResult;
    use crate::StorageBackend;
    use async_trait::async_trait;

    /// Backend that fails the test if it is ever reached.
    struct UnreachableBackend;

    #[async_trait]
    impl ObjectBackend for UnreachableBackend {
        async fn put_stream(
            &self,
            _: BucketClass,
            key: &str,
            _: &str,
            _: Option<u64>,
            _: BoxedReader,
        ) -> StorageResult<u64> {
            panic!("put_stream reached for {}", key)
        }
        async fn copy(&self, _: BucketClass, from: &str, _: BucketClass, _: &str) -> StorageResult<()> {
            panic!("copy reached for {}", from)
        }
        async fn delete(&self, _: BucketClass, key: &str) -> StorageResult<()> {
            panic!("delete reached for {}", key)
        }
        async fn get_stream(&self, _: BucketClass, key: &str) -> StorageResult<ByteStream> {
            panic!("get_stream reached for {}", key)
        }
        async fn exists(&self, _: BucketClass, key: &str) -> StorageResult<bool> {
            panic!("exists reached for {}", key)
        }
        async fn presign_get(
            &self,
            _: BucketClass,
            key: &str,
            _: &str,
            _: Duration,
        ) -> StorageResult<String> {
            panic!("presign_get reached for {}", key)
        }
        fn backend_type(&self) -> StorageBackend {
            StorageBackend::Local
        }
    }

    fn storage() -> DocumentStorage {
        DocumentStorage::new(Arc::new(UnreachableBackend))
    }

    fn reader() -> BoxedReader {
        Box::pin(std::io::Cursor::new(b"data".to_vec()))
    }

    #[tokio::test]
    async fn test_invalid_identifiers_fail_before_io() {
        let s = storage();
        let err = s.store_temporary("", "d1", reader(), 4, "text/plain").await.unwrap_err();
        assert!(err.is_validation());
        let err = s.store_temporary("t1", "", reader(), 4, "text/plain").await.unwrap_err();
        assert!(err.is_validation());
        let err = s.store_temporary("t1", "d/1", reader(), 4, "text/plain").await.unwrap_err();
        assert!(err.is_validation());
        let err = s.store_temporary("t1", "d1", reader(), 4, "plain").await.unwrap_err();
        assert!(err.is_validation());
        let err = s.store_temporary("temp", "d1", reader(), 4, "text/plain").await.unwrap_err();
        assert!(err.is_validation());

        let err = s.store_permanent("t1", "d1", "", "f1", "temp/t1/d1").await.unwrap_err();
        assert!(err.is_validation());
        let err = s.store_permanent("t1", "d1", "v1", "f1", "temp/t1/../d1").await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_cross_tenant_access_is_not_found_before_io() {
        let s = storage();
        assert!(s.get_document("t2", "temp/t1/d1").await.err().unwrap().is_not_found());
        assert!(s.get_document("t2", "t1/f1/d1/v1").await.err().unwrap().is_not_found());
        assert!(s.delete_document("t2", "quarantine/t1/d1").await.unwrap_err().is_not_found());
        assert!(s.exists("t2", "t1/f1/d1/v1").await.unwrap_err().is_not_found());
        assert!(s
            .move_to_quarantine("t2", "d1", "temp/t1/d1")
            .await
            .unwrap_err()
            .is_not_found());
        assert!(s
            .store_permanent("t2", "d1", "v1", "root", "temp/t1/d1")
            .await
            .unwrap_err()
            .is_not_found());
        assert!(s
            .get_presigned_url("t2", "t1/f1/d1/v1", "a.pdf", None)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_move_source_must_be_the_documents_temporary_object() {
        let s = storage();
        let err = s
            .store_permanent("t1", "d1", "v1", "root", "quarantine/t1/d1")
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let err = s.move_to_quarantine("t1", "d1", "temp/t1/d2").await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_presign_ttl_bounds() {
        let s = storage();
        let err = s
            .get_presigned_url("t1", "t1/f1/d1/v1", "a.pdf", Some(Duration::ZERO))
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let too_long = Duration::from_secs(MAX_PRESIGN_TTL_SECS + 1);
        let err = s
            .get_presigned_url("t1", "t1/f1/d1/v1", "a.pdf", Some(too_long))
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let err = s
            .get_presigned_url("t1", "t1/f1/d1/v1", " ", None)
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_batch_archive_validates_all_inputs_first() {
        let s = storage();
        let paths = vec!["t1/f1/d1/v1".to_string(), "t1/f1/d2/v1".to_string()];

        let err = s
            .create_batch_archive("t1", &paths, &["a.pdf".to_string()])
            .await
            .err()
            .unwrap();
        assert!(err.is_validation());

        let err = s.create_batch_archive("t1", &[], &[]).await.err().unwrap();
        assert!(err.is_validation());

        let mixed = vec!["t1/f1/d1/v1".to_string(), "t2/f1/d2/v1".to_string()];
        let names = vec!["a.pdf".to_string(), "b.pdf".to_string()];
        let err = s.create_batch_archive("t1", &mixed, &names).await.err().unwrap();
        assert!(err.is_not_found());
    }
}
