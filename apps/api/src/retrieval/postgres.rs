//! PostgreSQL-backed [`VectorIndex`].
//!
//! Rows live in a single `vector_documents` table partitioned by
//! `collection`. Each row records the embedding model that produced it and
//! queries only score rows from this index's own embedder, so switching
//! embedders never compares incompatible vectors.
//!
//! Similarity is computed in-process. A query reads only `(id, embedding)`
//! for the collection, then fetches text and metadata for the `top_k`
//! winners. Query cost still grows linearly with the collection size.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::info;

use super::embedding::{cosine_distance, Embedder};
use super::index::{
    check_unique_ids, rank, Document, IndexError, Metadata, NewDocument, ScoredDocument,
    VectorIndex,
};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS vector_documents (
    collection      TEXT        NOT NULL,
    id              TEXT        NOT NULL,
    text            TEXT        NOT NULL,
    embedding       REAL[]      NOT NULL,
    embedding_model TEXT        NOT NULL,
    metadata        JSONB       NOT NULL DEFAULT '{}'::jsonb,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (collection, id)
)
"#;

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, FromRow)]
struct EmbeddingRow {
    id: String,
    embedding: Vec<f32>,
}

#[derive(Debug, FromRow)]
struct ContentRow {
    id: String,
    text: String,
    metadata: Json<Metadata>,
}

pub struct PgVectorIndex {
    pool: PgPool,
    collection: String,
    embedder: Arc<dyn Embedder>,
}

impl PgVectorIndex {
    /// Opens the collection, creating the backing table when missing.
    pub async fn open(
        pool: PgPool,
        collection: impl Into<String>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, IndexError> {
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        let collection = collection.into();
        info!(
            "Vector collection '{}' ready (model: {})",
            collection,
            embedder.model_name()
        );
        Ok(Self {
            pool,
            collection,
            embedder,
        })
    }
}

#[async_trait]
impl VectorIndex for PgVectorIndex {
    async fn insert_documents(&self, batch: Vec<NewDocument>) -> Result<(), IndexError> {
        check_unique_ids(&batch)?;
        if batch.is_empty() {
            return Ok(());
        }

        let sources: Vec<String> = batch.iter().map(|d| d.embedding_source().to_string()).collect();
        let embeddings = self.embedder.embed_batch(&sources).await?;
        let ids: Vec<String> = batch.iter().map(|d| d.id.clone()).collect();

        let mut tx = self.pool.begin().await?;

        let existing: Option<String> = sqlx::query_scalar(
            "SELECT id FROM vector_documents WHERE collection = $1 AND id = ANY($2) LIMIT 1",
        )
        .bind(&self.collection)
        .bind(&ids)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(id) = existing {
            return Err(IndexError::DuplicateId(id));
        }

        for (doc, embedding) in batch.iter().zip(embeddings.iter()) {
            sqlx::query(
                r#"
                INSERT INTO vector_documents
                    (collection, id, text, embedding, embedding_model, metadata)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(&self.collection)
            .bind(&doc.id)
            .bind(&doc.text)
            .bind(embedding)
            .bind(self.embedder.model_name())
            .bind(Json(&doc.metadata))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_insert_error(e, &doc.id))?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<ScoredDocument>, IndexError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let query_vec = self.embedder.embed(text).await?;

        let candidates = sqlx::query_as::<_, EmbeddingRow>(
            r#"
            SELECT id, embedding
            FROM vector_documents
            WHERE collection = $1 AND embedding_model = $2
            "#,
        )
        .bind(&self.collection)
        .bind(self.embedder.model_name())
        .fetch_all(&self.pool)
        .await?;

        let ranked = score_rows(candidates, &query_vec, top_k);
        if ranked.is_empty() {
            return Ok(ranked);
        }

        let ids: Vec<String> = ranked.iter().map(|s| s.document.id.clone()).collect();
        let contents = sqlx::query_as::<_, ContentRow>(
            "SELECT id, text, metadata FROM vector_documents WHERE collection = $1 AND id = ANY($2)",
        )
        .bind(&self.collection)
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(attach_contents(ranked, contents))
    }

    async fn contains(&self, id: &str) -> Result<bool, IndexError> {
        let found: Option<i32> =
            sqlx::query_scalar("SELECT 1 FROM vector_documents WHERE collection = $1 AND id = $2")
                .bind(&self.collection)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    async fn count(&self) -> Result<usize, IndexError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM vector_documents WHERE collection = $1")
                .bind(&self.collection)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.max(0) as usize)
    }
}

/// A concurrent writer can win the race between the pre-check and the
/// INSERT; the primary key still rejects it.
fn map_insert_error(e: sqlx::Error, id: &str) -> IndexError {
    let is_unique_violation = e
        .as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == UNIQUE_VIOLATION)
        .unwrap_or(false);
    if is_unique_violation {
        IndexError::DuplicateId(id.to_string())
    } else {
        IndexError::from(e)
    }
}

/// Ranks candidates by distance. Text and metadata are left empty until
/// [`attach_contents`] fills them for the winners.
fn score_rows(rows: Vec<EmbeddingRow>, query_vec: &[f32], top_k: usize) -> Vec<ScoredDocument> {
    let scored = rows
        .into_iter()
        .map(|row| {
            let distance = cosine_distance(query_vec, &row.embedding);
            ScoredDocument {
                document: Document {
                    id: row.id,
                    text: String::new(),
                    embedding: row.embedding,
                    metadata: Metadata::new(),
                },
                distance,
            }
        })
        .collect();
    rank(scored, top_k)
}

/// Keeps ranking order; winners whose row vanished in between are dropped.
fn attach_contents(ranked: Vec<ScoredDocument>, contents: Vec<ContentRow>) -> Vec<ScoredDocument> {
    let mut by_id: HashMap<String, ContentRow> =
        contents.into_iter().map(|row| (row.id.clone(), row)).collect();
    ranked
        .into_iter()
        .filter_map(|mut scored| {
            let content = by_id.remove(&scored.document.id)?;
            scored.document.text = content.text;
            scored.document.metadata = content.metadata.0;
            Some(scored)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::retrieval::index::MetadataValue;

    fn row(id: &str, embedding: Vec<f32>) -> EmbeddingRow {
        EmbeddingRow {
            id: id.to_string(),
            embedding,
        }
    }

    fn content(id: &str) -> ContentRow {
        let mut metadata = Metadata::new();
        metadata.insert("career_goal".to_string(), MetadataValue::from(id));
        ContentRow {
            id: id.to_string(),
            text: format!("text for {id}"),
            metadata: Json(metadata),
        }
    }

    #[test]
    fn test_score_rows_ranks_by_distance() {
        let rows = vec![
            row("far", vec![0.0, 1.0]),
            row("near", vec![1.0, 0.1]),
            row("exact", vec![1.0, 0.0]),
        ];
        let scored = score_rows(rows, &[1.0, 0.0], 2);
        assert_eq!(scored.len(), 2);
        assert_eq!(scored[0].document.id, "exact");
        assert_eq!(scored[1].document.id, "near");
        assert!(scored[0].distance < 1e-6);
    }

    #[test]
    fn test_score_rows_empty() {
        assert!(score_rows(Vec::new(), &[1.0], 1).is_empty());
    }

    #[test]
    fn test_non_database_error_maps_to_storage_unavailable() {
        let err = map_insert_error(sqlx::Error::PoolTimedOut, "abc");
        assert!(matches!(err, IndexError::StorageUnavailable(_)));
    }

    #[test]
    fn test_attach_contents_keeps_rank_order() {
        let ranked = score_rows(
            vec![row("second", vec![1.0, 0.5]), row("first", vec![1.0, 0.0])],
            &[1.0, 0.0],
            2,
        );
        assert!(ranked.iter().all(|s| s.document.text.is_empty()));

        let docs = attach_contents(ranked, vec![content("second"), content("first")]);
        assert_eq!(docs[0].document.id, "first");
        assert_eq!(docs[0].document.text, "text for first");
        assert_eq!(
            docs[0].document.metadata.get("career_goal").and_then(|v| v.as_str()),
            Some("first")
        );
        assert_eq!(docs[1].document.text, "text for second");
    }

    #[test]
    fn test_attach_contents_drops_missing_rows() {
        let ranked = score_rows(
            vec![row("gone", vec![1.0, 0.0]), row("kept", vec![0.5, 0.5])],
            &[1.0, 0.0],
            2,
        );
        let docs = attach_contents(ranked, vec![content("kept")]);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].document.id, "kept");
    }
}
