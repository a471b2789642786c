//! Document lifecycle type (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::graph::DocumentGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    /// Completed/failed are terminal (§4.11): no further transition is
    /// valid once reached.
    pub fn is_terminal(self) -> bool {
        matches!(self, DocumentStatus::Completed | DocumentStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub byte_size: u64,
    pub storage_url: String,
    pub status: DocumentStatus,
    #[serde(default)]
    pub graph: Option<DocumentGraph>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn new(id: impl Into<String>, filename: impl Into<String>, byte_size: u64, storage_url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            filename: filename.into(),
            byte_size,
            storage_url: storage_url.into(),
            status: DocumentStatus::Pending,
            graph: None,
            summary: None,
            metadata: serde_json::Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Transitions status, enforcing the monotonic terminal rule (§4.11).
    /// Terminal states may still receive evaluation updates (metadata),
    /// so this only guards the `status` field itself.
    pub fn transition(&mut self, next: DocumentStatus, now: DateTime<Utc>) -> Result<(), String> {
        if self.status.is_terminal() && self.status != next {
            return Err(format!(
                "cannot transition out of terminal status {:?}",
                self.status
            ));
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_status_rejects_further_transition() {
        let mut doc = Document::new("d1", "f.pdf", 10, "s3://x");
        doc.transition(DocumentStatus::Processing, Utc::now()).unwrap();
        doc.transition(DocumentStatus::Completed, Utc::now()).unwrap();
        let err = doc.transition(DocumentStatus::Failed, Utc::now());
        assert!(err.is_err());
    }

    #[test]
    fn pending_to_processing_to_completed_is_valid() {
        let mut doc = Document::new("d1", "f.pdf", 10, "s3://x");
        assert!(doc.transition(DocumentStatus::Processing, Utc::now()).is_ok());
        assert!(doc.transition(DocumentStatus::Completed, Utc::now()).is_ok());
        assert!(doc.status.is_terminal());
    }
}
