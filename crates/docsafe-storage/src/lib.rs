//! Docsafe Storage Library
//!
//! Tenant-scoped object storage for uploaded documents. Objects live in one of
//! three bucket classes, each with its own retention and access policy:
//!
//! - **Temporary**: `temp/{tenant_id}/{document_id}`. Uploads land here and
//!   wait for their scan. The area is expected to carry a 24h expiry rule,
//!   which is the cleanup backstop for failed best-effort deletes.
//! - **Permanent**: `{tenant_id}/{folder_id}/{document_id}/{version_id}`.
//! - **Quarantine**: `quarantine/{tenant_id}/{document_id}`. Restrictive
//!   access and a distinct encryption key.
//!
//! The area of an existing object is resolved from its key prefix. Every
//! operation of [`DocumentStorage`] takes the caller's tenant id and compares
//! it with the tenant segment of the key before touching the backend.
//!
//! Backends implement the small [`ObjectBackend`] primitive set (streaming
//! put, server-side copy, delete, get, presign) and know nothing about
//! tenants. Key generation and parsing is centralized in [`keys`].

pub mod archive;
pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod service;
pub mod traits;

// Re-export commonly used types
pub use docsafe_core::StorageBackend;
pub use factory::create_backend;
pub use keys::{BucketClass, ParsedKey};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::{S3AreaEncryption, S3Storage};
pub use service::DocumentStorage;
pub use traits::{BoxedReader, ByteStream, ObjectBackend, StorageError, StorageResult};
