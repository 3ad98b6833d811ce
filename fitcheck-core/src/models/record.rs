use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Placeholder used in metadata when a row has no tag or JD name.
pub const UNKNOWN: &str = "Unknown";

/// One spreadsheet row. Blank cells are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRow {
    pub jd_name: Option<String>,
    pub job_description: Option<String>,
    pub resume: Option<String>,
    pub qa_text: Option<String>,
    pub tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    #[serde(rename = "Acceptance")]
    pub acceptance: String,
    #[serde(rename = "Category")]
    pub category: String,
    pub created_at: DateTime<Utc>,
    /// Session that uploaded the row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    /// Upload within that session; a re-upload gets a new one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<Uuid>,
}

impl RecordMetadata {
    pub fn for_row(row: &SourceRow, created_at: DateTime<Utc>) -> Self {
        Self {
            acceptance: row.tag.clone().unwrap_or_else(|| UNKNOWN.to_string()),
            category: row.jd_name.clone().unwrap_or_else(|| UNKNOWN.to_string()),
            created_at,
            session_id: None,
            upload_id: None,
        }
    }

    pub fn with_scope(mut self, scope: UploadScope) -> Self {
        self.session_id = Some(scope.session_id);
        self.upload_id = Some(scope.upload_id);
        self
    }
}

/// The session and upload a batch of records belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadScope {
    pub session_id: Uuid,
    pub upload_id: Uuid,
}

impl UploadScope {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            upload_id: Uuid::now_v7(),
        }
    }
}

/// A row shaped for the vector store. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: Uuid,
    pub metadata: RecordMetadata,
    pub content: String,
    pub embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_defaults_to_unknown() {
        let now = Utc::now();
        let meta = RecordMetadata::for_row(&SourceRow::default(), now);
        assert_eq!(meta.acceptance, UNKNOWN);
        assert_eq!(meta.category, UNKNOWN);
        assert_eq!(meta.created_at, now);
    }

    #[test]
    fn test_metadata_serializes_with_store_keys() {
        let row = SourceRow {
            jd_name: Some("Engineer".into()),
            tag: Some("Pass".into()),
            ..Default::default()
        };
        let meta = RecordMetadata::for_row(&row, Utc::now());
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["Acceptance"], "Pass");
        assert_eq!(json["Category"], "Engineer");
        assert!(json["created_at"].is_string());
        assert!(json.get("session_id").is_none());
    }

    #[test]
    fn test_scoped_metadata_carries_session_and_upload() {
        let scope = UploadScope::new(Uuid::now_v7());
        let meta = RecordMetadata::for_row(&SourceRow::default(), Utc::now()).with_scope(scope);
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["session_id"], scope.session_id.to_string());
        assert_eq!(json["upload_id"], scope.upload_id.to_string());

        let back: RecordMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);
    }
}
