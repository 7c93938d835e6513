//! Configuration module
//!
//! Configuration is read from environment variables (a `.env` file is loaded
//! first when present). Every setting has a typed default except the ones a
//! chosen backend cannot work without; those are enforced by [`Config::validate`].

use std::env;
use std::str::FromStr;

use crate::constants::{DEFAULT_PRESIGN_TTL_SECS, MAX_DEQUEUE_BATCH, MAX_PRESIGN_TTL_SECS};
use crate::storage_types::{QueueBackendKind, StorageBackend};

const CLAMAV_PORT: u16 = 3310;
const CLAMAV_TIMEOUT_SECS: u64 = 30;
const CLAMAV_MAX_SCAN_MB: u64 = 100;
const QUEUE_VISIBILITY_TIMEOUT_SECS: i32 = 30;
const QUEUE_WAIT_TIME_SECS: i32 = 0;
const WORKER_POLL_INTERVAL_MS: u64 = 5000;
const WORKER_BATCH_SIZE: usize = 10;
const WEBHOOK_TIMEOUT_SECS: u64 = 10;
const DIRECTORY_TIMEOUT_SECS: u64 = 5;

/// Object storage settings.
#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    /// Custom endpoint for S3-compatible providers (MinIO, etc.)
    pub s3_endpoint: Option<String>,
    pub temp_kms_key_id: Option<String>,
    pub permanent_kms_key_id: Option<String>,
    pub quarantine_kms_key_id: Option<String>,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    pub local_signing_secret: Option<String>,
    pub presign_default_ttl_secs: u64,
}

/// Scan queue settings.
#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub backend: QueueBackendKind,
    pub sqs_queue_url: Option<String>,
    pub sqs_dead_letter_queue_url: Option<String>,
    pub sqs_endpoint: Option<String>,
    pub max_batch_size: usize,
    pub visibility_timeout_secs: i32,
    pub wait_time_secs: i32,
}

/// ClamAV settings.
#[derive(Clone, Debug)]
pub struct ScannerConfig {
    pub clamav_host: String,
    pub clamav_port: u16,
    pub timeout_secs: u64,
    pub max_scan_bytes: u64,
}

/// Drain loop settings.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub poll_interval_ms: u64,
    pub batch_size: usize,
}

/// Outbound event webhook settings. Disabled when `url` is unset.
#[derive(Clone, Debug)]
pub struct WebhookConfig {
    pub url: Option<String>,
    pub signing_secret: Option<String>,
    pub timeout_secs: u64,
}

/// Document directory (status owner) lookups. Disabled when `url` is unset.
#[derive(Clone, Debug)]
pub struct DirectoryConfig {
    pub url: Option<String>,
    pub auth_token: Option<String>,
    pub timeout_secs: u64,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String,
    pub aws_region: Option<String>,
    pub storage: StorageConfig,
    pub queue: QueueConfig,
    pub scanner: ScannerConfig,
    pub worker: WorkerConfig,
    pub webhook: WebhookConfig,
    pub directory: DirectoryConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let environment = get("ENVIRONMENT")
            .or_else(|| get("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let storage_backend = match get("STORAGE_BACKEND") {
            Some(value) => value.parse::<StorageBackend>()?,
            None => StorageBackend::S3,
        };

        let queue_backend = match get("QUEUE_BACKEND") {
            Some(value) => value.parse::<QueueBackendKind>()?,
            None => QueueBackendKind::Sqs,
        };

        let storage = StorageConfig {
            backend: storage_backend,
            s3_bucket: get("S3_BUCKET"),
            s3_region: get("S3_REGION"),
            s3_endpoint: get("S3_ENDPOINT"),
            temp_kms_key_id: get("S3_TEMP_KMS_KEY_ID"),
            permanent_kms_key_id: get("S3_PERMANENT_KMS_KEY_ID"),
            quarantine_kms_key_id: get("S3_QUARANTINE_KMS_KEY_ID"),
            local_storage_path: get("LOCAL_STORAGE_PATH"),
            local_storage_base_url: get("LOCAL_STORAGE_BASE_URL"),
            local_signing_secret: get("LOCAL_STORAGE_SIGNING_SECRET"),
            presign_default_ttl_secs: parse_or(
                get("PRESIGN_DEFAULT_TTL_SECS"),
                DEFAULT_PRESIGN_TTL_SECS,
            ),
        };

        let queue = QueueConfig {
            backend: queue_backend,
            sqs_queue_url: get("SQS_SCAN_QUEUE_URL"),
            sqs_dead_letter_queue_url: get("SQS_DEAD_LETTER_QUEUE_URL"),
            sqs_endpoint: get("SQS_ENDPOINT"),
            max_batch_size: parse_or(get("SCAN_QUEUE_MAX_BATCH"), MAX_DEQUEUE_BATCH),
            visibility_timeout_secs: parse_or(
                get("SCAN_QUEUE_VISIBILITY_TIMEOUT_SECS"),
                QUEUE_VISIBILITY_TIMEOUT_SECS,
            ),
            wait_time_secs: parse_or(get("SCAN_QUEUE_WAIT_TIME_SECS"), QUEUE_WAIT_TIME_SECS),
        };

        let scanner = ScannerConfig {
            clamav_host: get("CLAMAV_HOST").unwrap_or_else(|| "localhost".to_string()),
            clamav_port: parse_or(get("CLAMAV_PORT"), CLAMAV_PORT),
            timeout_secs: parse_or(get("CLAMAV_TIMEOUT_SECS"), CLAMAV_TIMEOUT_SECS),
            max_scan_bytes: parse_or(get("CLAMAV_MAX_SCAN_MB"), CLAMAV_MAX_SCAN_MB)
                .saturating_mul(1024 * 1024),
        };

        let worker = WorkerConfig {
            poll_interval_ms: parse_or(get("SCAN_WORKER_POLL_INTERVAL_MS"), WORKER_POLL_INTERVAL_MS),
            batch_size: parse_or(get("SCAN_WORKER_BATCH_SIZE"), WORKER_BATCH_SIZE),
        };

        let webhook = WebhookConfig {
            url: get("EVENT_WEBHOOK_URL"),
            signing_secret: get("EVENT_WEBHOOK_SECRET"),
            timeout_secs: parse_or(get("EVENT_WEBHOOK_TIMEOUT_SECS"), WEBHOOK_TIMEOUT_SECS),
        };

        let directory = DirectoryConfig {
            url: get("DOCUMENT_DIRECTORY_URL"),
            auth_token: get("DOCUMENT_DIRECTORY_TOKEN"),
            timeout_secs: parse_or(get("DOCUMENT_DIRECTORY_TIMEOUT_SECS"), DIRECTORY_TIMEOUT_SECS),
        };

        Ok(Config {
            environment,
            aws_region: get("AWS_REGION"),
            storage,
            queue,
            scanner,
            worker,
            webhook,
            directory,
        })
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    /// Region for S3, falling back to the general AWS region.
    pub fn s3_region(&self) -> Option<&str> {
        self.storage
            .s3_region
            .as_deref()
            .or(self.aws_region.as_deref())
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        match self.storage.backend {
            StorageBackend::S3 => {
                if self.storage.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when STORAGE_BACKEND=s3"
                    ));
                }
                if self.s3_region().is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when STORAGE_BACKEND=s3"
                    ));
                }
                if self.is_production()
                    && self.storage.quarantine_kms_key_id.is_some()
                    && self.storage.quarantine_kms_key_id == self.storage.permanent_kms_key_id
                {
                    return Err(anyhow::anyhow!(
                        "S3_QUARANTINE_KMS_KEY_ID must differ from S3_PERMANENT_KMS_KEY_ID"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.storage.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when STORAGE_BACKEND=local"
                    ));
                }
                if self.storage.local_storage_base_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_BASE_URL must be set when STORAGE_BACKEND=local"
                    ));
                }
                if self.is_production() && self.storage.local_signing_secret.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_SIGNING_SECRET must be set in production"
                    ));
                }
            }
        }

        if self.queue.backend == QueueBackendKind::Sqs {
            if self.queue.sqs_queue_url.is_none() {
                return Err(anyhow::anyhow!(
                    "SQS_SCAN_QUEUE_URL must be set when QUEUE_BACKEND=sqs"
                ));
            }
            if self.queue.sqs_dead_letter_queue_url.is_none() {
                return Err(anyhow::anyhow!(
                    "SQS_DEAD_LETTER_QUEUE_URL must be set when QUEUE_BACKEND=sqs"
                ));
            }
        } else if self.is_production() {
            return Err(anyhow::anyhow!(
                "QUEUE_BACKEND=memory is not durable and cannot be used in production"
            ));
        }

        if self.queue.max_batch_size == 0 || self.queue.max_batch_size > MAX_DEQUEUE_BATCH {
            return Err(anyhow::anyhow!(
                "SCAN_QUEUE_MAX_BATCH must be between 1 and {}",
                MAX_DEQUEUE_BATCH
            ));
        }

        if !(0..=20).contains(&self.queue.wait_time_secs) {
            return Err(anyhow::anyhow!(
                "SCAN_QUEUE_WAIT_TIME_SECS must be between 0 and 20"
            ));
        }

        if self.storage.presign_default_ttl_secs == 0
            || self.storage.presign_default_ttl_secs > MAX_PRESIGN_TTL_SECS
        {
            return Err(anyhow::anyhow!(
                "PRESIGN_DEFAULT_TTL_SECS must be between 1 and {}",
                MAX_PRESIGN_TTL_SECS
            ));
        }

        if self.worker.batch_size == 0 {
            return Err(anyhow::anyhow!("SCAN_WORKER_BATCH_SIZE must be at least 1"));
        }

        if self.webhook.url.is_some() && self.is_production() && self.webhook.signing_secret.is_none()
        {
            return Err(anyhow::anyhow!(
                "EVENT_WEBHOOK_SECRET must be set when EVENT_WEBHOOK_URL is used in production"
            ));
        }

        if self.directory.url.is_none() && self.is_production() {
            return Err(anyhow::anyhow!(
                "DOCUMENT_DIRECTORY_URL must be set in production"
            ));
        }

        Ok(())
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned()).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.environment, "development");
        assert_eq!(config.storage.backend, StorageBackend::S3);
        assert_eq!(config.queue.backend, QueueBackendKind::Sqs);
        assert_eq!(config.queue.max_batch_size, MAX_DEQUEUE_BATCH);
        assert_eq!(config.scanner.clamav_port, 3310);
        assert_eq!(config.scanner.max_scan_bytes, 100 * 1024 * 1024);
        assert!(config.webhook.url.is_none());
    }

    #[test]
    fn test_huge_scan_limit_saturates() {
        let config = config_from(&[("CLAMAV_MAX_SCAN_MB", &u64::MAX.to_string())]);
        assert_eq!(config.scanner.max_scan_bytes, u64::MAX);

        let config = config_from(&[("CLAMAV_MAX_SCAN_MB", "17592186044416")]);
        assert_eq!(config.scanner.max_scan_bytes, u64::MAX);
    }

    #[test]
    fn test_directory_required_in_production() {
        let base = [
            ("ENVIRONMENT", "production"),
            ("S3_BUCKET", "docs"),
            ("AWS_REGION", "eu-west-1"),
            ("SQS_SCAN_QUEUE_URL", "https://sqs.eu-west-1.amazonaws.com/1/scan"),
            ("SQS_DEAD_LETTER_QUEUE_URL", "https://sqs.eu-west-1.amazonaws.com/1/scan-dlq"),
        ];
        assert!(config_from(&base).validate().is_err());

        let mut with_directory = base.to_vec();
        with_directory.push(("DOCUMENT_DIRECTORY_URL", "http://documents.internal"));
        let config = config_from(&with_directory);
        assert!(config.validate().is_ok());
        assert_eq!(config.directory.timeout_secs, 5);
    }

    #[test]
    fn test_invalid_numbers_fall_back_to_defaults() {
        let config = config_from(&[("CLAMAV_PORT", "not-a-port"), ("SCAN_WORKER_BATCH_SIZE", "")]);
        assert_eq!(config.scanner.clamav_port, 3310);
        assert_eq!(config.worker.batch_size, 10);
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let result = Config::from_lookup(|key| {
            (key == "STORAGE_BACKEND").then(|| "nfs".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_s3_requires_bucket_and_region() {
        let config = config_from(&[("QUEUE_BACKEND", "memory")]);
        assert!(config.validate().is_err());

        let config = config_from(&[
            ("QUEUE_BACKEND", "memory"),
            ("S3_BUCKET", "docs"),
            ("AWS_REGION", "eu-west-1"),
        ]);
        assert!(config.validate().is_ok());
        assert_eq!(config.s3_region(), Some("eu-west-1"));
    }

    #[test]
    fn test_local_backend_validation() {
        let config = config_from(&[
            ("STORAGE_BACKEND", "local"),
            ("QUEUE_BACKEND", "memory"),
            ("LOCAL_STORAGE_PATH", "/var/lib/docsafe"),
            ("LOCAL_STORAGE_BASE_URL", "http://localhost:4000/files"),
        ]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_memory_queue_rejected_in_production() {
        let config = config_from(&[
            ("ENVIRONMENT", "production"),
            ("STORAGE_BACKEND", "local"),
            ("QUEUE_BACKEND", "memory"),
            ("LOCAL_STORAGE_PATH", "/var/lib/docsafe"),
            ("LOCAL_STORAGE_BASE_URL", "https://files.example.com"),
            ("LOCAL_STORAGE_SIGNING_SECRET", "secret"),
        ]);
        assert!(config.is_production());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_batch_size_above_ceiling_rejected() {
        let config = config_from(&[
            ("STORAGE_BACKEND", "local"),
            ("QUEUE_BACKEND", "memory"),
            ("LOCAL_STORAGE_PATH", "/tmp/docsafe"),
            ("LOCAL_STORAGE_BASE_URL", "http://localhost"),
            ("SCAN_QUEUE_MAX_BATCH", "50"),
        ]);
        assert!(config.validate().is_err());
    }
}
