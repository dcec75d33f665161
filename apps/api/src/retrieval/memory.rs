//! In-process [`VectorIndex`] backed by a `RwLock<Vec<Document>>`.
//!
//! Queries are a brute-force scan, which is plenty for the knowledge corpus
//! and for caches in the low thousands of entries.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::embedding::{cosine_distance, Embedder};
use super::index::{
    check_unique_ids, rank, Document, IndexError, NewDocument, ScoredDocument, VectorIndex,
};

pub struct InMemoryIndex {
    name: String,
    embedder: Arc<dyn Embedder>,
    documents: RwLock<Vec<Document>>,
}

impl InMemoryIndex {
    pub fn new(name: impl Into<String>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            name: name.into(),
            embedder,
            documents: RwLock::new(Vec::new()),
        }
    }

    fn poisoned(&self) -> IndexError {
        IndexError::StorageUnavailable(format!("index '{}' lock poisoned", self.name))
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn insert_documents(&self, batch: Vec<NewDocument>) -> Result<(), IndexError> {
        check_unique_ids(&batch)?;
        if batch.is_empty() {
            return Ok(());
        }

        // Embed before taking the lock so slow embedders never block readers.
        let sources: Vec<String> = batch.iter().map(|d| d.embedding_source().to_string()).collect();
        let embeddings = self.embedder.embed_batch(&sources).await?;

        let mut documents = self.documents.write().map_err(|_| self.poisoned())?;
        let duplicate = {
            let existing: HashSet<&str> = documents.iter().map(|d| d.id.as_str()).collect();
            batch
                .iter()
                .find(|d| existing.contains(d.id.as_str()))
                .map(|d| d.id.clone())
        };
        if let Some(dup) = duplicate {
            return Err(IndexError::DuplicateId(dup));
        }

        documents.extend(batch.into_iter().zip(embeddings).map(|(doc, embedding)| Document {
            id: doc.id,
            text: doc.text,
            embedding,
            metadata: doc.metadata,
        }));
        Ok(())
    }

    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<ScoredDocument>, IndexError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let query_vec = self.embedder.embed(text).await?;

        let documents = self.documents.read().map_err(|_| self.poisoned())?;
        let scored = documents
            .iter()
            .map(|doc| ScoredDocument {
                distance: cosine_distance(&query_vec, &doc.embedding),
                document: doc.clone(),
            })
            .collect();
        Ok(rank(scored, top_k))
    }

    async fn contains(&self, id: &str) -> Result<bool, IndexError> {
        let documents = self.documents.read().map_err(|_| self.poisoned())?;
        Ok(documents.iter().any(|d| d.id == id))
    }

    async fn count(&self) -> Result<usize, IndexError> {
        let documents = self.documents.read().map_err(|_| self.poisoned())?;
        Ok(documents.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::embedding::{EmbeddingError, HashingEmbedder};
    use crate::retrieval::index::Metadata;

    fn index() -> InMemoryIndex {
        InMemoryIndex::new("test", Arc::new(HashingEmbedder::new()))
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Err(EmbeddingError::Malformed("model offline".to_string()))
        }
    }

    #[tokio::test]
    async fn test_query_on_empty_index_returns_nothing() {
        let results = index().query("anything", 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_query_returns_nearest_first() {
        let idx = index();
        idx.insert(
            strings(&["ml", "web"]),
            strings(&[
                "machine learning with pytorch and tensorflow",
                "frontend web development with react",
            ]),
            None,
        )
        .await
        .unwrap();

        let results = idx.query("react web developer", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].document.id, "web");
        assert!(results[0].distance <= results[1].distance);
    }

    #[tokio::test]
    async fn test_query_respects_top_k() {
        let idx = index();
        idx.insert(strings(&["a", "b", "c"]), strings(&["one", "two", "three"]), None)
            .await
            .unwrap();
        assert_eq!(idx.query("one", 1).await.unwrap().len(), 1);
        assert!(idx.query("one", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exact_text_has_near_zero_distance() {
        let idx = index();
        idx.insert(strings(&["a"]), strings(&["Backend Developer | Rust"]), None)
            .await
            .unwrap();
        let results = idx.query("Backend Developer | Rust", 1).await.unwrap();
        assert!(results[0].distance < 1e-5);
    }

    #[tokio::test]
    async fn test_duplicate_id_is_rejected_without_partial_write() {
        let idx = index();
        idx.insert(strings(&["a"]), strings(&["first"]), None).await.unwrap();

        let err = idx
            .insert(strings(&["b", "a"]), strings(&["second", "third"]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::DuplicateId(id) if id == "a"));
        assert_eq!(idx.count().await.unwrap(), 1);
        assert!(!idx.contains("b").await.unwrap());
    }

    #[tokio::test]
    async fn test_metadata_is_stored_with_document() {
        let idx = index();
        let mut metadata = Metadata::new();
        metadata.insert("career_goal".into(), "DevOps".into());
        idx.insert(strings(&["a"]), strings(&["ci cd pipelines"]), Some(vec![metadata.clone()]))
            .await
            .unwrap();
        let results = idx.query("ci cd", 1).await.unwrap();
        assert_eq!(results[0].document.metadata, metadata);
    }

    #[tokio::test]
    async fn test_embed_text_drives_similarity_but_text_is_returned() {
        let idx = index();
        idx.insert_documents(vec![NewDocument {
            id: "entry".into(),
            text: "Title: Policy Auditor\nLearning Roadmap: ...".into(),
            embed_text: Some("Cloud Security Engineer | AWS".into()),
            metadata: Metadata::new(),
        }])
        .await
        .unwrap();

        let results = idx.query("Cloud Security Engineer | AWS", 1).await.unwrap();
        assert!(results[0].distance < 1e-5);
        assert!(results[0].document.text.starts_with("Title: Policy Auditor"));
    }

    #[tokio::test]
    async fn test_embedding_failure_surfaces_as_embedding_error() {
        let idx = InMemoryIndex::new("broken", Arc::new(FailingEmbedder));
        let err = idx.insert(strings(&["a"]), strings(&["x"]), None).await.unwrap_err();
        assert!(matches!(err, IndexError::Embedding(_)));
        let err = idx.query("x", 1).await.unwrap_err();
        assert!(matches!(err, IndexError::Embedding(_)));
        assert_eq!(idx.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_inserts_are_all_kept() {
        let idx = Arc::new(index());
        let mut handles = Vec::new();
        for i in 0..32 {
            let idx = Arc::clone(&idx);
            handles.push(tokio::spawn(async move {
                idx.insert(vec![format!("doc-{i}")], vec![format!("entry number {i}")], None)
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(idx.count().await.unwrap(), 32);
        for i in 0..32 {
            assert!(idx.contains(&format!("doc-{i}")).await.unwrap());
        }
    }
}
