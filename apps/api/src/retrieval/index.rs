//! Vector index contract shared by the knowledge base and the generation cache.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::embedding::EmbeddingError;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("document id '{0}' already exists in the index")]
    DuplicateId(String),

    #[error("insert batch has {ids} ids, {texts} texts and {metadatas} metadata entries")]
    LengthMismatch {
        ids: usize,
        texts: usize,
        metadatas: usize,
    },
}

impl From<sqlx::Error> for IndexError {
    fn from(e: sqlx::Error) -> Self {
        IndexError::StorageUnavailable(e.to_string())
    }
}

/// A scalar metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetadataValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::Str(s.to_string())
    }
}

impl From<i64> for MetadataValue {
    fn from(i: i64) -> Self {
        MetadataValue::Int(i)
    }
}

pub type Metadata = BTreeMap<String, MetadataValue>;

/// A stored unit of text together with its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
}

/// A document to be written. The embedding is computed from `embed_text`
/// when given, otherwise from `text`.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub id: String,
    pub text: String,
    pub embed_text: Option<String>,
    pub metadata: Metadata,
}

impl NewDocument {
    pub fn embedding_source(&self) -> &str {
        self.embed_text.as_deref().unwrap_or(&self.text)
    }
}

/// A query hit. Lower `distance` means more similar.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: Document,
    pub distance: f32,
}

/// A similarity index over text documents.
///
/// Implementations embed with a single [`Embedder`](super::embedding::Embedder)
/// for their whole lifetime and serialize writes internally: a batch becomes
/// visible all at once or not at all.
///
/// Duplicate ids are rejected with [`IndexError::DuplicateId`] and nothing
/// from the offending batch is written.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn insert_documents(&self, documents: Vec<NewDocument>) -> Result<(), IndexError>;

    /// Up to `top_k` documents ordered by ascending distance. Empty when the
    /// index is empty.
    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<ScoredDocument>, IndexError>;

    async fn contains(&self, id: &str) -> Result<bool, IndexError>;

    async fn count(&self) -> Result<usize, IndexError>;

    /// Parallel-sequence form of [`insert_documents`](VectorIndex::insert_documents);
    /// each text is embedded as-is.
    async fn insert(
        &self,
        ids: Vec<String>,
        texts: Vec<String>,
        metadatas: Option<Vec<Metadata>>,
    ) -> Result<(), IndexError> {
        let documents = zip_batch(ids, texts, metadatas)?;
        self.insert_documents(documents).await
    }
}

fn zip_batch(
    ids: Vec<String>,
    texts: Vec<String>,
    metadatas: Option<Vec<Metadata>>,
) -> Result<Vec<NewDocument>, IndexError> {
    let metadata_len = metadatas.as_ref().map(|m| m.len()).unwrap_or(ids.len());
    if ids.len() != texts.len() || metadata_len != ids.len() {
        return Err(IndexError::LengthMismatch {
            ids: ids.len(),
            texts: texts.len(),
            metadatas: metadata_len,
        });
    }

    let metadatas = metadatas.unwrap_or_else(|| vec![Metadata::new(); ids.len()]);
    Ok(ids
        .into_iter()
        .zip(texts)
        .zip(metadatas)
        .map(|((id, text), metadata)| NewDocument {
            id,
            text,
            embed_text: None,
            metadata,
        })
        .collect())
}

/// Rejects a batch that repeats an id.
pub(crate) fn check_unique_ids(documents: &[NewDocument]) -> Result<(), IndexError> {
    let mut seen = HashSet::with_capacity(documents.len());
    for doc in documents {
        if !seen.insert(doc.id.as_str()) {
            return Err(IndexError::DuplicateId(doc.id.clone()));
        }
    }
    Ok(())
}

/// Sorts ascending by distance and keeps the first `top_k`.
pub(crate) fn rank(mut scored: Vec<ScoredDocument>, top_k: usize) -> Vec<ScoredDocument> {
    scored.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(top_k);
    scored
}
