pub mod document;
pub mod event;
pub mod task;

pub use document::{DocumentStatus, DocumentVersion};
pub use event::DocumentEvent;
pub use task::{DeadLetterRecord, MalformedMessageRecord, ScanTask};
