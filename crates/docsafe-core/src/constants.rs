//! Pipeline-wide constants.

/// Number of retries a scan task may consume before it is dead-lettered.
///
/// A task observed failing with `retry_count == MAX_SCAN_RETRIES` is never
/// retried again.
pub const MAX_SCAN_RETRIES: u32 = 3;

/// Absolute ceiling on messages returned by one batch dequeue. SQS refuses
/// more than 10 per receive call, and the in-memory backend mirrors that.
pub const MAX_DEQUEUE_BATCH: usize = 10;

/// Folder segment used for permanent keys when a document has no folder.
pub const DEFAULT_FOLDER_ID: &str = "root";

/// Default lifetime of presigned download URLs.
pub const DEFAULT_PRESIGN_TTL_SECS: u64 = 900;

/// Longest presigned URL lifetime accepted (S3's SigV4 limit of 7 days).
pub const MAX_PRESIGN_TTL_SECS: u64 = 7 * 24 * 60 * 60;
