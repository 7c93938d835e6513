//! Docsafe Services Layer
//!
//! Adapters for external engines the pipeline consumes as black boxes. Each
//! adapter implements a contract from `docsafe-core` (currently
//! [`docsafe_core::ScanEngine`]) so the worker never depends on a vendor
//! client directly.

pub mod services;

#[cfg(feature = "clamav")]
pub use services::clamav::ClamAVService;
