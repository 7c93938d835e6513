use crate::keys::BucketClass;
use crate::traits::{BoxedReader, ByteStream, ObjectBackend, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::presigning::PresigningConfig;
use futures::StreamExt;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::buffered::BufWriter;
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{Attribute, Attributes, ObjectStoreExt, Result as ObjectResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// KMS key ids applied as SSE-KMS defaults to writes in each area.
///
/// A `None` entry falls back to the bucket's default encryption.
#[derive(Clone, Debug, Default)]
pub struct S3AreaEncryption {
    pub temporary_kms_key_id: Option<String>,
    pub permanent_kms_key_id: Option<String>,
    pub quarantine_kms_key_id: Option<String>,
}

/// S3 storage implementation
///
/// The three areas share one bucket and are separated by key prefix. Each
/// area gets its own object store handle so that writes (including the
/// destination side of a server-side copy) carry that area's KMS key.
#[derive(Clone)]
pub struct S3Storage {
    temporary: Arc<AmazonS3>,
    permanent: Arc<AmazonS3>,
    quarantine: Arc<AmazonS3>,
    presigner: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    /// * `encryption` - Per-area KMS keys
    pub async fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
        encryption: S3AreaEncryption,
    ) -> StorageResult<Self> {
        let build = |kms_key_id: &Option<String>| -> StorageResult<Arc<AmazonS3>> {
            let mut builder = AmazonS3Builder::from_env()
                .with_region(region.clone())
                .with_bucket_name(bucket.clone());

            if let Some(ref endpoint) = endpoint_url {
                let allow_http = endpoint.starts_with("http://");
                builder = builder
                    .with_endpoint(endpoint.clone())
                    .with_allow_http(allow_http);
            }

            if let Some(key_id) = kms_key_id {
                builder = builder.with_sse_kms_encryption(key_id.clone());
            }

            builder
                .build()
                .map(Arc::new)
                .map_err(|e| StorageError::ConfigError(e.to_string()))
        };

        let temporary = build(&encryption.temporary_kms_key_id)?;
        let permanent = build(&encryption.permanent_kms_key_id)?;
        let quarantine = build(&encryption.quarantine_kms_key_id)?;

        let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.clone()))
            .load()
            .await;
        let mut s3_config = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(ref endpoint) = endpoint_url {
            s3_config = s3_config.endpoint_url(endpoint).force_path_style(true);
        }
        let presigner = aws_sdk_s3::Client::from_conf(s3_config.build());

        tracing::info!(
            bucket = %bucket,
            region = %region,
            temporary_kms = encryption.temporary_kms_key_id.is_some(),
            permanent_kms = encryption.permanent_kms_key_id.is_some(),
            quarantine_kms = encryption.quarantine_kms_key_id.is_some(),
            "S3 storage initialized"
        );

        Ok(S3Storage {
            temporary,
            permanent,
            quarantine,
            presigner,
            bucket,
        })
    }

    fn store(&self, class: BucketClass) -> &Arc<AmazonS3> {
        match class {
            BucketClass::Temporary => &self.temporary,
            BucketClass::Permanent => &self.permanent,
            BucketClass::Quarantine => &self.quarantine,
        }
    }
}

#[async_trait]
impl ObjectBackend for S3Storage {
    async fn put_stream(
        &self,
        class: BucketClass,
        key: &str,
        content_type: &str,
        _content_length: Option<u64>,
        mut reader: BoxedReader,
    ) -> StorageResult<u64> {
        let start = std::time::Instant::now();
        let location = Path::from(key.to_string());
        let store: Arc<dyn object_store::ObjectStore> = self.store(class).clone();

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());

        // Multipart once the buffer fills, so memory use stays bounded.
        let mut writer = BufWriter::new(store, location).with_attributes(attributes);

        let copied = tokio::io::copy(&mut reader, &mut writer).await;
        let finished = match copied {
            Ok(n) => writer.shutdown().await.map(|_| n),
            Err(e) => Err(e),
        };

        match finished {
            Ok(size) => {
                tracing::info!(
                    bucket = %self.bucket,
                    area = %class,
                    key = %key,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 stream upload successful"
                );
                Ok(size)
            }
            Err(e) => {
                if let Err(abort_err) = writer.abort().await {
                    tracing::warn!(
                        error = %abort_err,
                        key = %key,
                        "Failed to abort S3 multipart upload"
                    );
                }
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    area = %class,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 stream upload failed"
                );
                Err(StorageError::UploadFailed(e.to_string()))
            }
        }
    }

    async fn copy(
        &self,
        from_class: BucketClass,
        from_key: &str,
        to_class: BucketClass,
        to_key: &str,
    ) -> StorageResult<()> {
        let start = std::time::Instant::now();
        let from = Path::from(from_key.to_string());
        let to = Path::from(to_key.to_string());

        // Issued on the destination handle so the copy is encrypted with its key.
        let copy_result: ObjectResult<_> = self.store(to_class).copy(&from, &to).await;

        copy_result.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(from_key.to_string()),
            other => {
                tracing::error!(
                    error = %other,
                    bucket = %self.bucket,
                    from_area = %from_class,
                    to_area = %to_class,
                    from_key = %from_key,
                    to_key = %to_key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 copy failed"
                );
                StorageError::CopyFailed(other.to_string())
            }
        })?;

        tracing::info!(
            from_key = %from_key,
            to_key = %to_key,
            to_area = %to_class,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 copy successful"
        );

        Ok(())
    }

    async fn delete(&self, class: BucketClass, key: &str) -> StorageResult<()> {
        let start = std::time::Instant::now();
        let location = Path::from(key.to_string());

        let result: ObjectResult<_> = self.store(class).delete(&location).await;

        match result {
            Ok(()) | Err(ObjectStoreError::NotFound { .. }) => {}
            Err(e) => {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    area = %class,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 delete failed"
                );
                return Err(StorageError::DeleteFailed(e.to_string()));
            }
        }

        tracing::info!(
            bucket = %self.bucket,
            area = %class,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 delete successful"
        );

        Ok(())
    }

    async fn get_stream(&self, class: BucketClass, key: &str) -> StorageResult<ByteStream> {
        let start = std::time::Instant::now();
        let location = Path::from(key.to_string());

        let result: ObjectResult<_> = self.store(class).get(&location).await;

        let result = result.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
            other => StorageError::DownloadFailed(other.to_string()),
        })?;

        let bucket = self.bucket.clone();
        let key = key.to_string();

        let stream = result.into_stream().map(move |res| match res {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                tracing::error!(
                    bucket = %bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 stream download error"
                );
                Err(StorageError::DownloadFailed(e.to_string()))
            }
        });

        Ok(Box::pin(stream))
    }

    async fn exists(&self, class: BucketClass, key: &str) -> StorageResult<bool> {
        let location = Path::from(key.to_string());
        match self.store(class).head(&location).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    async fn presign_get(
        &self,
        _class: BucketClass,
        key: &str,
        content_disposition: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        let presigning = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        let request = self
            .presigner
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .response_content_disposition(content_disposition)
            .presigned(presigning)
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    "S3 presign failed"
                );
                StorageError::PresignFailed(e.to_string())
            })?;

        Ok(request.uri().to_string())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}
