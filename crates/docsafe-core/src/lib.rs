//! Docsafe Core Library
//!
//! This crate provides the domain models, error taxonomy, configuration, and
//! validation shared by the storage, queue, and worker crates. It also owns
//! the scanning-engine contract so that engines can be implemented outside the
//! worker without a dependency cycle.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod scanning;
pub mod storage_types;
pub mod validation;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use scanning::{ContentStream, ScanEngine, ScanVerdict};
pub use storage_types::{QueueBackendKind, StorageBackend};
