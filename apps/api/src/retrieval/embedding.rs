//! Embedding functions and vector distance.
//!
//! Every [`VectorIndex`](super::index::VectorIndex) owns exactly one
//! [`Embedder`] and uses it for both writes and queries, so vectors produced
//! by different functions are never compared.
//!
//! - [`HashingEmbedder`] is the default: offline, deterministic, and robust
//!   to case and whitespace variations.
//! - [`RemoteEmbedder`] calls an OpenAI-compatible `/embeddings` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Dimensionality of [`HashingEmbedder`] vectors.
pub const HASHING_DIMS: usize = 384;
const HASHING_MODEL: &str = "feature-hash-384";
/// Trigram features are weighted below whole tokens so shared words dominate.
const TRIGRAM_WEIGHT: f32 = 0.5;
const FIELD_SEPARATOR: char = '|';

const REMOTE_MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("embedding response was malformed: {0}")]
    Malformed(String),
}

/// A deterministic text → vector function.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier persisted next to stored vectors.
    fn model_name(&self) -> &str;
    fn dims(&self) -> usize;
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// Cosine distance `1 - cos(a, b)`, clamped to `[0, 2]`.
///
/// 0.0 means identical direction. Zero-length, zero-norm, or mismatched
/// vectors are treated as unrelated (distance 1.0).
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 1.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 1.0;
    }

    (1.0 - dot / denom).clamp(0.0, 2.0)
}

// ────────────────────────────────────────────────────────────────────────────
// HashingEmbedder
// ────────────────────────────────────────────────────────────────────────────

/// Signed feature-hashing embedder over word tokens and character trigrams.
///
/// Text is lowercased and split on anything that is not alphanumeric, so
/// `"Cloud security engineer "` and `"Cloud Security Engineer"` produce the
/// same vector. Trigrams give partial credit to related word forms
/// ("developer" / "development").
///
/// `|` separates fields. Features from the second and later fields are
/// hashed with their field position, so `"Rust | Backend Developer"` and
/// `"Backend Developer | Rust"` land far apart.
#[derive(Debug, Clone, Default)]
pub struct HashingEmbedder;

impl HashingEmbedder {
    pub fn new() -> Self {
        Self
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; HASHING_DIMS];

        for (position, field) in text.split(FIELD_SEPARATOR).enumerate() {
            let prefix = if position == 0 {
                String::new()
            } else {
                format!("{position}\u{1f}")
            };

            for token in tokenize(field) {
                add_feature(&mut vector, format!("{prefix}{token}").as_bytes(), 1.0);

                let padded: Vec<char> = format!("#{token}#").chars().collect();
                for window in padded.windows(3) {
                    let gram: String = window.iter().collect();
                    add_feature(
                        &mut vector,
                        format!("{prefix}{gram}").as_bytes(),
                        TRIGRAM_WEIGHT,
                    );
                }
            }
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        HASHING_MODEL
    }

    fn dims(&self) -> usize {
        HASHING_DIMS
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.embed_sync(text))
    }
}

/// Lowercased alphanumeric tokens.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn add_feature(vector: &mut [f32], feature: &[u8], weight: f32) {
    let hash = fnv1a(feature);
    let idx = (hash % vector.len() as u64) as usize;
    // The top bit picks the sign so collisions tend to cancel rather than pile up.
    let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
    vector[idx] += sign * weight;
}

fn fnv1a(data: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    data.iter()
        .fold(OFFSET, |hash, &b| (hash ^ b as u64).wrapping_mul(PRIME))
}

// ────────────────────────────────────────────────────────────────────────────
// RemoteEmbedder
// ────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// Embeddings client for OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct RemoteEmbedder {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    dims: usize,
}

impl RemoteEmbedder {
    pub fn new(
        api_key: String,
        base_url: &str,
        model: String,
        dims: usize,
    ) -> Result<Self, EmbeddingError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            api_key,
            model,
            dims,
        })
    }

    async fn request(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: inputs,
        };

        let mut last_error: Option<EmbeddingError> = None;

        for attempt in 0..REMOTE_MAX_RETRIES {
            if attempt > 0 {
                let delay = Duration::from_millis(500 * (1 << attempt));
                warn!(
                    "Embedding call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = match self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(EmbeddingError::Http(e));
                    continue;
                }
            };

            let status = response.status();
            if status.as_u16() == 429 || status.is_server_error() {
                let message = response.text().await.unwrap_or_default();
                last_error = Some(EmbeddingError::Api {
                    status: status.as_u16(),
                    message,
                });
                continue;
            }
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(EmbeddingError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let parsed: EmbeddingResponse = response.json().await?;
            return collect_vectors(parsed, inputs.len(), self.dims);
        }

        Err(last_error.unwrap_or_else(|| {
            EmbeddingError::Malformed("no embedding attempt was made".to_string())
        }))
    }
}

/// Orders vectors by input index and checks count and dimensionality.
fn collect_vectors(
    mut parsed: EmbeddingResponse,
    expected: usize,
    dims: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    parsed.data.sort_by_key(|d| d.index);
    if parsed.data.len() != expected {
        return Err(EmbeddingError::Malformed(format!(
            "{} embeddings returned for {} inputs",
            parsed.data.len(),
            expected
        )));
    }
    if let Some(bad) = parsed.data.iter().find(|d| d.embedding.len() != dims) {
        return Err(EmbeddingError::Malformed(format!(
            "embedding {} has {} dimensions, expected {}",
            bad.index,
            bad.embedding.len(),
            dims
        )));
    }
    Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.request(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::Malformed("empty embedding batch".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts).await
    }
}
