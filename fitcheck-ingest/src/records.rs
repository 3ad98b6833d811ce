//! Shaping `SourceRow`s into embedded `Record`s.

use std::sync::Arc;

use chrono::Utc;
use fitcheck_core::{
    EmbeddingBackend, EmbeddingError, Record, RecordMetadata, SourceRow, UploadScope,
};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Embedding failed for row {row}: {source}")]
    Embedding {
        row: usize,
        #[source]
        source: EmbeddingError,
    },
}

/// Concatenate the row's sections with their literal labels, in fixed order.
pub fn build_content(row: &SourceRow) -> String {
    let field = |v: &Option<String>| v.as_deref().unwrap_or("").to_string();
    format!(
        "JD NAME: {}\nJob Description: {}\nRESUME: {}\nInterview_Details: {}",
        field(&row.jd_name),
        field(&row.job_description),
        field(&row.resume),
        field(&row.qa_text),
    )
}

/// Builds records one at a time, issuing strictly increasing ids.
pub struct RecordBuilder {
    embedder: Arc<dyn EmbeddingBackend>,
    last_id: Option<Uuid>,
    scope: Option<UploadScope>,
}

impl RecordBuilder {
    pub fn new(embedder: Arc<dyn EmbeddingBackend>) -> Self {
        Self {
            embedder,
            last_id: None,
            scope: None,
        }
    }

    /// Stamp every built record with `scope`.
    pub fn with_scope(mut self, scope: UploadScope) -> Self {
        self.scope = Some(scope);
        self
    }

    fn next_id(&mut self) -> Uuid {
        let mut id = Uuid::now_v7();
        // v7 ids sort by time; a clock step backwards must not reorder a batch
        if let Some(last) = self.last_id {
            if id <= last {
                id = Uuid::from_u128(last.as_u128() + 1);
            }
        }
        self.last_id = Some(id);
        id
    }

    /// Build a single record. A failure reports row 0.
    pub async fn build(&mut self, row: &SourceRow) -> Result<Record, RecordError> {
        self.build_row(0, row).await
    }

    async fn build_row(&mut self, index: usize, row: &SourceRow) -> Result<Record, RecordError> {
        let content = build_content(row);
        let embedding = self
            .embedder
            .embed(&content)
            .await
            .map_err(|source| RecordError::Embedding { row: index, source })?;
        let id = self.next_id();

        let mut metadata = RecordMetadata::for_row(row, Utc::now());
        if let Some(scope) = self.scope {
            metadata = metadata.with_scope(scope);
        }

        Ok(Record {
            id,
            metadata,
            content,
            embedding,
        })
    }

    /// Build every row in order. The first embedding failure aborts the batch.
    pub async fn build_all(&mut self, rows: &[SourceRow]) -> Result<Vec<Record>, RecordError> {
        let mut records = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let record = self.build_row(index, row).await.map_err(|e| {
                tracing::error!(row = index, error = %e, "Embedding failed, aborting batch");
                e
            })?;
            records.push(record);
        }
        tracing::info!(
            count = records.len(),
            backend = self.embedder.name(),
            "Built records"
        );
        Ok(records)
    }
}
