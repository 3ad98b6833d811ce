use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{cosine_similarity, StoreError, VectorStore};
use crate::embeddings::EmbeddingBackend;
use crate::models::{MetadataFilter, Record, SearchHit};

/// In-process store: brute-force cosine scan over every record.
pub struct MemoryVectorStore {
    records: RwLock<BTreeMap<Uuid, Record>>,
    embedder: Arc<dyn EmbeddingBackend>,
    min_score: Option<f64>,
}

impl MemoryVectorStore {
    pub fn new(embedder: Arc<dyn EmbeddingBackend>, min_score: Option<f64>) -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            embedder,
            min_score,
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn create_tables(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn create_index(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn upsert(&self, records: &[Record]) -> Result<(), StoreError> {
        let expected = self.embedder.dimensions();
        if let Some(bad) = records.iter().find(|r| r.embedding.len() != expected) {
            return Err(StoreError::DimensionMismatch {
                id: bad.id,
                expected,
                actual: bad.embedding.len(),
            });
        }

        let mut guard = self.records.write().await;
        for record in records {
            guard.insert(record.id, record.clone());
        }
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<SearchHit>, StoreError> {
        if self.records.read().await.is_empty() {
            return Ok(Vec::new());
        }
        // embed before locking so writers are not held up by the network call
        let query_vector = self.embedder.embed_query(query).await?;

        let guard = self.records.read().await;
        let mut hits: Vec<SearchHit> = guard
            .values()
            .filter(|r| filter.matches(&r.metadata))
            .map(|r| {
                let score = cosine_similarity(&r.embedding, &query_vector) as f64;
                SearchHit::from_record(r, score)
            })
            .filter(|hit| self.min_score.map_or(true, |min| hit.score >= min))
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit.max(1));
        Ok(hits)
    }

    async fn remove_session(&self, session_id: Uuid) -> Result<u64, StoreError> {
        let mut guard = self.records.write().await;
        let before = guard.len();
        guard.retain(|_, r| r.metadata.session_id != Some(session_id));
        Ok((before - guard.len()) as u64)
    }

    async fn health(&self) -> Result<String, StoreError> {
        Ok(format!("in-memory ({} records)", self.len().await))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
