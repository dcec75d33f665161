//! Knowledge Retriever — maps a free-text career goal to the closest
//! role-category snippet of the static knowledge corpus.

use std::sync::Arc;

use tracing::{debug, info};

use super::index::{IndexError, VectorIndex};

/// Returned when the knowledge index has nothing to offer.
pub const FALLBACK_MARKET_CONTEXT: &str =
    "General software engineering principles are always in demand.";

/// Reference corpus: one snippet per role key.
pub const JOB_ROLES_KNOWLEDGE: &[(&str, &str)] = &[
    (
        "backend",
        "For backend roles, employers seek skills in cloud services (AWS, GCP), containerization (Docker, Kubernetes), database management (SQL, NoSQL), and building scalable RESTful APIs.",
    ),
    (
        "frontend",
        "For frontend roles, demand is high for modern JavaScript frameworks (React, Vue), state management tools (Redux), and experience with build tools like Vite or Webpack.",
    ),
    (
        "ai_ml",
        "For AI/ML roles, key skills include Python, frameworks like PyTorch or TensorFlow, understanding of MLOps, and deploying models as APIs.",
    ),
    (
        "data_science",
        "For Data Science roles, skills in data analysis, statistical modeling, data visualization, and libraries like Pandas and Scikit-learn are essential.",
    ),
    (
        "devops",
        "For DevOps, skills in CI/CD (Jenkins, GitHub Actions), infrastructure as code (Terraform), and container orchestration (Kubernetes) are critical.",
    ),
    (
        "fullstack",
        "For Fullstack roles, a mix of frontend and backend skills is required, including a primary web framework, database skills, and deployment knowledge.",
    ),
];

/// Owns the knowledge corpus and its index.
#[derive(Clone)]
pub struct KnowledgeRetriever {
    index: Arc<dyn VectorIndex>,
    corpus: Vec<(String, String)>,
}

impl KnowledgeRetriever {
    /// Retriever over the reference role corpus.
    pub fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self::with_corpus(
            index,
            JOB_ROLES_KNOWLEDGE
                .iter()
                .map(|(id, text)| (id.to_string(), text.to_string()))
                .collect(),
        )
    }

    pub fn with_corpus(index: Arc<dyn VectorIndex>, corpus: Vec<(String, String)>) -> Self {
        Self { index, corpus }
    }

    /// Loads the corpus into the index, skipping role keys already present.
    ///
    /// Safe to call repeatedly: the index ends up with exactly one document
    /// per role key. Returns the number of documents inserted. Index errors
    /// propagate, since a broken knowledge base is fatal at startup.
    pub async fn initialize(&self) -> Result<usize, IndexError> {
        info!("Setting up the knowledge base...");

        let mut ids = Vec::new();
        let mut texts = Vec::new();
        for (id, text) in &self.corpus {
            if self.index.contains(id).await? {
                debug!("Knowledge entry '{id}' already present, skipping");
                continue;
            }
            ids.push(id.clone());
            texts.push(text.clone());
        }

        let inserted = ids.len();
        if inserted > 0 {
            self.index.insert(ids, texts, None).await?;
        }

        info!(
            "Knowledge base ready: {} new, {} total roles",
            inserted,
            self.corpus.len()
        );
        Ok(inserted)
    }

    /// Text of the single closest knowledge snippet, or
    /// [`FALLBACK_MARKET_CONTEXT`] when the index is empty.
    pub async fn get_market_context(&self, career_goal: &str) -> Result<String, IndexError> {
        let mut results = self.index.query(career_goal, 1).await?;
        match results.pop() {
            Some(hit) => {
                debug!(
                    "Market context for '{}' → '{}' (distance {:.3})",
                    career_goal, hit.document.id, hit.distance
                );
                Ok(hit.document.text)
            }
            None => Ok(FALLBACK_MARKET_CONTEXT.to_string()),
        }
    }
}
