//! PostgreSQL + pgvector backed store.
//!
//! Schema (created by `create_tables`):
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS <table> (
//!     id         UUID PRIMARY KEY,
//!     metadata   JSONB NOT NULL,
//!     contents   TEXT NOT NULL,
//!     embedding  VECTOR(<dims>) NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT now()
//! );
//! ```
//!
//! Search scores are `1 - cosine_distance`.

use std::sync::Arc;

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use super::{StoreError, VectorStore};
use crate::config::DatabaseConfig;
use crate::embeddings::EmbeddingBackend;
use crate::models::{MetadataFilter, Record, RecordMetadata, SearchHit};

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
}

pub async fn health_check(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(row.0)
}

pub async fn check_pgvector(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) =
        sqlx::query_as("SELECT extversion FROM pg_extension WHERE extname = 'vector'")
            .fetch_one(pool)
            .await?;
    Ok(row.0)
}

/// Table names are interpolated into DDL, so only plain identifiers pass.
fn validate_table_name(name: &str) -> Result<(), StoreError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .map_or(false, |c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(StoreError::InvalidTableName(name.to_string()))
    }
}

pub struct PgVectorStore {
    pool: PgPool,
    table: String,
    embedder: Arc<dyn EmbeddingBackend>,
    min_score: Option<f64>,
}

impl PgVectorStore {
    pub fn new(
        pool: PgPool,
        table: &str,
        embedder: Arc<dyn EmbeddingBackend>,
        min_score: Option<f64>,
    ) -> Result<Self, StoreError> {
        validate_table_name(table)?;
        Ok(Self {
            pool,
            table: table.to_string(),
            embedder,
            min_score,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn dimensions(&self) -> usize {
        self.embedder.dimensions()
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn create_tables(&self) -> Result<(), StoreError> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
            .map_err(StoreError::Setup)?;

        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id UUID PRIMARY KEY,
                metadata JSONB NOT NULL,
                contents TEXT NOT NULL,
                embedding VECTOR({dims}) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
            table = self.table,
            dims = self.dimensions()
        );
        sqlx::query(&ddl)
            .execute(&self.pool)
            .await
            .map_err(StoreError::Setup)?;

        tracing::debug!(table = %self.table, "Vector table ready");
        Ok(())
    }

    async fn create_index(&self) -> Result<(), StoreError> {
        let ddl = format!(
            "CREATE INDEX IF NOT EXISTS {table}_embedding_idx ON {table} \
             USING hnsw (embedding vector_cosine_ops)",
            table = self.table
        );
        sqlx::query(&ddl).execute(&self.pool).await?;
        Ok(())
    }

    async fn upsert(&self, records: &[Record]) -> Result<(), StoreError> {
        let expected = self.dimensions();
        if let Some(bad) = records.iter().find(|r| r.embedding.len() != expected) {
            return Err(StoreError::DimensionMismatch {
                id: bad.id,
                expected,
                actual: bad.embedding.len(),
            });
        }

        let sql = format!(
            r#"
            INSERT INTO {table} (id, metadata, contents, embedding, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET metadata = EXCLUDED.metadata,
                contents = EXCLUDED.contents,
                embedding = EXCLUDED.embedding
            "#,
            table = self.table
        );

        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(&sql)
                .bind(record.id)
                .bind(serde_json::to_value(&record.metadata)?)
                .bind(&record.content)
                .bind(Vector::from(record.embedding.clone()))
                .bind(record.metadata.created_at)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        tracing::info!(table = %self.table, count = records.len(), "Upserted records");
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let query_vector = Vector::from(self.embedder.embed_query(query).await?);

        let sql = format!(
            r#"
            SELECT id, metadata, contents, 1 - (embedding <=> $1) AS score
            FROM {table}
            WHERE metadata @> $2
            ORDER BY embedding <=> $1
            LIMIT $3
            "#,
            table = self.table
        );

        let rows = sqlx::query_as::<_, (Uuid, serde_json::Value, String, f64)>(&sql)
            .bind(&query_vector)
            .bind(filter.to_jsonb())
            .bind(limit.max(1) as i64)
            .fetch_all(&self.pool)
            .await?;

        let mut hits = Vec::with_capacity(rows.len());
        for (id, metadata, content, score) in rows {
            if self.min_score.map_or(false, |min| score < min) {
                continue;
            }
            let metadata: RecordMetadata = serde_json::from_value(metadata)?;
            hits.push(SearchHit {
                id,
                metadata,
                content,
                score,
            });
        }

        tracing::debug!(table = %self.table, hits = hits.len(), "pgvector search complete");
        Ok(hits)
    }

    async fn remove_session(&self, session_id: Uuid) -> Result<u64, StoreError> {
        let sql = format!("DELETE FROM {table} WHERE metadata @> $1", table = self.table);
        let result = sqlx::query(&sql)
            .bind(serde_json::json!({ "session_id": session_id.to_string() }))
            .execute(&self.pool)
            .await?;

        tracing::debug!(table = %self.table, session = %session_id, removed = result.rows_affected(), "Session records removed");
        Ok(result.rows_affected())
    }

    async fn health(&self) -> Result<String, StoreError> {
        let pg_version = health_check(&self.pool).await?;
        let vector_version = check_pgvector(&self.pool)
            .await
            .unwrap_or_else(|e| format!("unavailable: {}", e));
        Ok(format!("{}; pgvector {}", pg_version, vector_version))
    }

    fn name(&self) -> &str {
        "pgvector"
    }
}
