//! Docsafe scan worker
//!
//! The asynchronous half of document ingestion: the scan task queue, the
//! worker that drives each task to a disposition, outcome events and the
//! metrics around them. Storage lives in `docsafe-storage`; scanning engines
//! in `docsafe-services`.

pub mod directory;
pub mod events;
pub mod factory;
pub mod metrics;
pub mod queue;
pub mod worker;

pub use directory::{DocumentDirectory, DocumentRegistry, NoopDirectory};
#[cfg(feature = "directory-http")]
pub use directory::{HttpDirectoryConfig, HttpDocumentDirectory};
pub use events::{BroadcastPublisher, CompositePublisher, EventError, EventPublisher};
#[cfg(feature = "webhook")]
pub use events::{WebhookPublisher, WebhookPublisherConfig};
pub use metrics::{ScanMetrics, ScanMetricsSnapshot};
pub use queue::{
    InMemoryQueueBackend, QueueBackend, QueueError, ReceivedMessage, ScanTaskQueue,
    ScanTaskQueueConfig,
};
pub use worker::{DrainError, ScanWorker, TaskOutcome};
