use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::record::{Record, RecordMetadata, UploadScope};

/// A stored record returned by a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: Uuid,
    pub metadata: RecordMetadata,
    pub content: String,
    /// 1 - cosine distance
    pub score: f64,
}

impl SearchHit {
    pub fn from_record(record: &Record, score: f64) -> Self {
        Self {
            id: record.id,
            metadata: record.metadata.clone(),
            content: record.content.clone(),
            score,
        }
    }
}

/// Exact-match restriction on record metadata. Empty = match everything.
///
/// The session and upload scope is never taken from request bodies; the
/// workflow sets it for every search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceptance: Option<String>,
    #[serde(skip)]
    pub session_id: Option<Uuid>,
    #[serde(skip)]
    pub upload_id: Option<Uuid>,
}

impl MetadataFilter {
    pub fn is_empty(&self) -> bool {
        self.category.is_none()
            && self.acceptance.is_none()
            && self.session_id.is_none()
            && self.upload_id.is_none()
    }

    /// Restrict to records from one upload.
    pub fn scoped(mut self, scope: UploadScope) -> Self {
        self.session_id = Some(scope.session_id);
        self.upload_id = Some(scope.upload_id);
        self
    }

    pub fn matches(&self, metadata: &RecordMetadata) -> bool {
        self.category.as_ref().map_or(true, |c| *c == metadata.category)
            && self
                .acceptance
                .as_ref()
                .map_or(true, |a| *a == metadata.acceptance)
            && self.session_id.map_or(true, |s| metadata.session_id == Some(s))
            && self.upload_id.map_or(true, |u| metadata.upload_id == Some(u))
    }

    /// JSONB containment document using the stored key names.
    pub fn to_jsonb(&self) -> serde_json::Value {
        let mut doc = serde_json::Map::new();
        if let Some(category) = &self.category {
            doc.insert("Category".into(), category.clone().into());
        }
        if let Some(acceptance) = &self.acceptance {
            doc.insert("Acceptance".into(), acceptance.clone().into());
        }
        if let Some(session_id) = self.session_id {
            doc.insert("session_id".into(), session_id.to_string().into());
        }
        if let Some(upload_id) = self.upload_id {
            doc.insert("upload_id".into(), upload_id.to_string().into());
        }
        serde_json::Value::Object(doc)
    }
}
