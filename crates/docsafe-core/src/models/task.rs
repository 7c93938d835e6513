use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::MAX_SCAN_RETRIES;

/// A unit of scanning work, living only as a queue message.
///
/// The serialized form is a flat JSON object with the keys `documentID`,
/// `versionID`, `tenantID`, `storagePath` and `retryCount`; producers in other
/// services depend on those exact names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanTask {
    #[serde(rename = "documentID")]
    pub document_id: String,
    #[serde(rename = "versionID")]
    pub version_id: String,
    #[serde(rename = "tenantID")]
    pub tenant_id: String,
    #[serde(rename = "storagePath")]
    pub storage_path: String,
    #[serde(rename = "retryCount", default)]
    pub retry_count: u32,
}

impl ScanTask {
    pub fn new(
        document_id: impl Into<String>,
        version_id: impl Into<String>,
        tenant_id: impl Into<String>,
        storage_path: impl Into<String>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            version_id: version_id.into(),
            tenant_id: tenant_id.into(),
            storage_path: storage_path.into(),
            retry_count: 0,
        }
    }

    /// Copy of this task with the retry counter advanced by one.
    pub fn next_attempt(&self) -> Self {
        Self {
            retry_count: self.retry_count.saturating_add(1),
            ..self.clone()
        }
    }

    /// True once the task has used up its retry budget.
    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= MAX_SCAN_RETRIES
    }
}

/// Body of a dead-letter message: the abandoned task plus why it was abandoned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    #[serde(flatten)]
    pub task: ScanTask,
    pub reason: String,
    #[serde(rename = "failedAt")]
    pub failed_at: DateTime<Utc>,
}

/// Dead-letter body for a message that could not be decoded as a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MalformedMessageRecord {
    pub body: String,
    pub reason: String,
    #[serde(rename = "failedAt")]
    pub failed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format_uses_exact_keys() {
        let task = ScanTask::new("d1", "v1", "t1", "temp/t1/d1");
        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "documentID": "d1",
                "versionID": "v1",
                "tenantID": "t1",
                "storagePath": "temp/t1/d1",
                "retryCount": 0
            })
        );
    }

    #[test]
    fn test_missing_retry_count_defaults_to_zero() {
        let task: ScanTask = serde_json::from_str(
            r#"{"documentID":"d1","versionID":"v1","tenantID":"t1","storagePath":"temp/t1/d1"}"#,
        )
        .unwrap();
        assert_eq!(task.retry_count, 0);
    }

    #[test]
    fn test_next_attempt_does_not_mutate_original() {
        let task = ScanTask::new("d1", "v1", "t1", "temp/t1/d1");
        let retried = task.next_attempt();
        assert_eq!(task.retry_count, 0);
        assert_eq!(retried.retry_count, 1);
        assert_eq!(retried.document_id, task.document_id);
    }

    #[test]
    fn test_retries_exhausted_at_bound() {
        let mut task = ScanTask::new("d1", "v1", "t1", "temp/t1/d1");
        for _ in 0..MAX_SCAN_RETRIES {
            assert!(!task.retries_exhausted());
            task = task.next_attempt();
        }
        assert!(task.retries_exhausted());
    }

    #[test]
    fn test_dead_letter_record_is_flat() {
        let record = DeadLetterRecord {
            task: ScanTask::new("d1", "v1", "t1", "temp/t1/d1"),
            reason: "scanner unavailable".to_string(),
            failed_at: Utc::now(),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["documentID"], "d1");
        assert_eq!(value["reason"], "scanner unavailable");
        assert!(value.get("task").is_none());
    }
}
