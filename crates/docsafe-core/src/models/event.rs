use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::document::DocumentStatus;

/// Outcome events published by the scan worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DocumentEvent {
    /// The document scanned clean and now lives in permanent storage.
    #[serde(rename = "document.processed")]
    Processed {
        tenant_id: String,
        document_id: String,
        version_id: String,
        storage_path: String,
        occurred_at: DateTime<Utc>,
    },

    /// The scanner flagged the document; it now lives in quarantine.
    #[serde(rename = "document.quarantined")]
    Quarantined {
        tenant_id: String,
        document_id: String,
        version_id: String,
        details: String,
        quarantine_path: String,
        occurred_at: DateTime<Utc>,
    },

    /// Scanning kept failing and the task was dead-lettered.
    #[serde(rename = "document.scan_failed")]
    ScanFailed {
        tenant_id: String,
        document_id: String,
        version_id: String,
        error: String,
        attempts: u32,
        occurred_at: DateTime<Utc>,
    },
}

impl DocumentEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            DocumentEvent::Processed { .. } => "document.processed",
            DocumentEvent::Quarantined { .. } => "document.quarantined",
            DocumentEvent::ScanFailed { .. } => "document.scan_failed",
        }
    }

    pub fn tenant_id(&self) -> &str {
        match self {
            DocumentEvent::Processed { tenant_id, .. }
            | DocumentEvent::Quarantined { tenant_id, .. }
            | DocumentEvent::ScanFailed { tenant_id, .. } => tenant_id,
        }
    }

    pub fn document_id(&self) -> &str {
        match self {
            DocumentEvent::Processed { document_id, .. }
            | DocumentEvent::Quarantined { document_id, .. }
            | DocumentEvent::ScanFailed { document_id, .. } => document_id,
        }
    }

    pub fn version_id(&self) -> &str {
        match self {
            DocumentEvent::Processed { version_id, .. }
            | DocumentEvent::Quarantined { version_id, .. }
            | DocumentEvent::ScanFailed { version_id, .. } => version_id,
        }
    }

    /// Status the document version takes once this event is applied.
    pub fn resulting_status(&self) -> DocumentStatus {
        match self {
            DocumentEvent::Processed { .. } => DocumentStatus::Available,
            DocumentEvent::Quarantined { .. } => DocumentStatus::Quarantined,
            DocumentEvent::ScanFailed { .. } => DocumentStatus::ScanFailed,
        }
    }

    /// Storage path the document lives at after the event, when it moved.
    pub fn storage_path(&self) -> Option<&str> {
        match self {
            DocumentEvent::Processed { storage_path, .. } => Some(storage_path),
            DocumentEvent::Quarantined {
                quarantine_path, ..
            } => Some(quarantine_path),
            DocumentEvent::ScanFailed { .. } => None,
        }
    }
}
