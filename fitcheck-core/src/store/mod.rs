//! Vector store capability.
//!
//! The workflow only sees `VectorStore`. `PgVectorStore` persists into
//! PostgreSQL + pgvector; `MemoryVectorStore` keeps records in-process for
//! tests and single-user demos.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{FitcheckConfig, StoreBackend};
use crate::embeddings::{EmbeddingBackend, EmbeddingError};
use crate::error::FitcheckError;
use crate::models::{MetadataFilter, Record, SearchHit};

pub mod memory;
pub mod pg;

pub use memory::MemoryVectorStore;
pub use pg::PgVectorStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Vector store setup failed: {0}")]
    Setup(#[source] sqlx::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Query embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Invalid table name '{0}': use letters, digits and underscores")]
    InvalidTableName(String),

    #[error("Record {id} has {actual} dimensions, store expects {expected}")]
    DimensionMismatch {
        id: uuid::Uuid,
        expected: usize,
        actual: usize,
    },

    #[error("Stored metadata is malformed: {0}")]
    Metadata(#[from] serde_json::Error),
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Idempotent storage setup.
    async fn create_tables(&self) -> Result<(), StoreError>;

    /// Idempotent search index build.
    async fn create_index(&self) -> Result<(), StoreError>;

    /// Insert or replace by id. All-or-nothing.
    async fn upsert(&self, records: &[Record]) -> Result<(), StoreError>;

    /// Embed `query` and return up to `limit` nearest records, best first.
    async fn search(
        &self,
        query: &str,
        limit: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<SearchHit>, StoreError>;

    /// Delete every record uploaded by `session_id`. Returns how many went.
    async fn remove_session(&self, session_id: uuid::Uuid) -> Result<u64, StoreError>;

    /// Short human-readable description of the backend state.
    async fn health(&self) -> Result<String, StoreError>;

    fn name(&self) -> &str;
}

/// Build the store selected by `[store] backend`.
pub async fn create_store(
    config: &FitcheckConfig,
    embedder: Arc<dyn EmbeddingBackend>,
) -> Result<Arc<dyn VectorStore>, FitcheckError> {
    let min_score = config.retrieval.min_score;
    match config.store.backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory vector store");
            Ok(Arc::new(MemoryVectorStore::new(embedder, min_score)))
        }
        StoreBackend::Pgvector => {
            let pool = pg::create_pool(&config.database).await?;
            let store = PgVectorStore::new(pool, &config.store.table_name, embedder, min_score)?;
            tracing::info!(table = %config.store.table_name, "Using pgvector store");
            Ok(Arc::new(store))
        }
    }
}

/// Cosine similarity; 0.0 for mismatched or zero-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
