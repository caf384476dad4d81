//! Audit entry data structures
//!
//! Defines the structure of audit log entries: which backup operation ran,
//! what it touched, and a JSON snapshot of the record involved.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Backup operations that are audited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Restore,
    Export,
    Delete,
    Purge,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Create => write!(f, "CREATE"),
            Operation::Restore => write!(f, "RESTORE"),
            Operation::Export => write!(f, "EXPORT"),
            Operation::Delete => write!(f, "DELETE"),
            Operation::Purge => write!(f, "PURGE"),
        }
    }
}

/// Kinds of records an audited operation acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Backup,
    Export,
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityType::Backup => write!(f, "Backup"),
            EntityType::Export => write!(f, "Export"),
        }
    }
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the operation occurred (UTC)
    pub timestamp: DateTime<Utc>,

    pub operation: Operation,

    pub entity_type: EntityType,

    /// ID of the affected record (empty for a purge run)
    pub entity_id: String,

    /// Artifact filename, when there is one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// JSON snapshot of the record or report involved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AuditEntry {
    /// Create an entry for an operation on one record
    pub fn new<T: Serialize>(
        operation: Operation,
        entity_type: EntityType,
        entity_id: impl Into<String>,
        filename: Option<String>,
        details: &T,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            entity_type,
            entity_id: entity_id.into(),
            filename,
            details: serde_json::to_value(details).ok(),
        }
    }

    /// Create an entry for a purge run, carrying its report
    pub fn purge<T: Serialize>(report: &T) -> Self {
        Self::new(Operation::Purge, EntityType::Backup, "", None, report)
    }

    /// Format the entry for human-readable output
    pub fn format_human_readable(&self) -> String {
        let mut output = format!(
            "[{}] {} {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.operation,
            self.entity_type,
        );

        if !self.entity_id.is_empty() {
            output.push_str(&format!(" {}", self.entity_id));
        }
        if let Some(name) = &self.filename {
            output.push_str(&format!(" ({})", name));
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operation_display() {
        assert_eq!(Operation::Create.to_string(), "CREATE");
        assert_eq!(Operation::Restore.to_string(), "RESTORE");
        assert_eq!(Operation::Purge.to_string(), "PURGE");
    }

    #[test]
    fn test_entry_carries_details() {
        let entry = AuditEntry::new(
            Operation::Create,
            EntityType::Backup,
            "bak-12345678",
            Some("backup-manual-x.gz".into()),
            &json!({"size": 42}),
        );

        assert_eq!(entry.entity_id, "bak-12345678");
        assert_eq!(entry.details.unwrap()["size"], 42);
    }

    #[test]
    fn test_serialization() {
        let entry = AuditEntry::purge(&json!({"purgedAuto": []}));

        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("filename"));
        let deserialized: AuditEntry = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.operation, Operation::Purge);
        assert_eq!(deserialized.entity_type, EntityType::Backup);
    }

    #[test]
    fn test_human_readable_format() {
        let entry = AuditEntry::new(
            Operation::Export,
            EntityType::Export,
            "exp-12345678",
            Some("export-1.zip".into()),
            &json!({}),
        );

        let formatted = entry.format_human_readable();
        assert!(formatted.contains("EXPORT"));
        assert!(formatted.contains("exp-12345678"));
        assert!(formatted.contains("export-1.zip"));
    }
}
