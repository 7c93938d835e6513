use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Lifecycle status of a document version.
///
/// `Processing` is the only non-terminal state. `ScanFailed` is terminal but
/// leaves the object in the temporary area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Processing,
    Available,
    Quarantined,
    ScanFailed,
}

impl DocumentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DocumentStatus::Processing)
    }
}

impl Display for DocumentStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            DocumentStatus::Processing => write!(f, "processing"),
            DocumentStatus::Available => write!(f, "available"),
            DocumentStatus::Quarantined => write!(f, "quarantined"),
            DocumentStatus::ScanFailed => write!(f, "scan_failed"),
        }
    }
}

impl FromStr for DocumentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(DocumentStatus::Processing),
            "available" => Ok(DocumentStatus::Available),
            "quarantined" => Ok(DocumentStatus::Quarantined),
            "scan_failed" => Ok(DocumentStatus::ScanFailed),
            _ => Err(anyhow::anyhow!("Invalid document status: {}", s)),
        }
    }
}

/// A single uploaded version of a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentVersion {
    pub tenant_id: String,
    pub document_id: String,
    pub version_id: String,
    pub folder_id: Option<String>,
    pub storage_path: String,
    pub content_type: String,
    pub size: u64,
    pub status: DocumentStatus,
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentVersion {
    /// A freshly accepted upload, still waiting for its scan.
    pub fn processing(
        tenant_id: impl Into<String>,
        document_id: impl Into<String>,
        version_id: impl Into<String>,
        storage_path: impl Into<String>,
        content_type: impl Into<String>,
        size: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            tenant_id: tenant_id.into(),
            document_id: document_id.into(),
            version_id: version_id.into(),
            folder_id: None,
            storage_path: storage_path.into(),
            content_type: content_type.into(),
            size,
            status: DocumentStatus::Processing,
            uploaded_at: now,
            updated_at: now,
        }
    }

    pub fn with_folder(mut self, folder_id: impl Into<String>) -> Self {
        self.folder_id = Some(folder_id.into());
        self
    }
}
