//! Profile analysis — turns a code-hosting profile URL into a short text
//! summary of the developer's recent work for the generation prompt.
//! Implementations report failures as typed ProfileError values; they never
//! return warning text in place of a summary.

pub mod github;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Could not extract a valid username from '{0}'")]
    InvalidUrl(String),

    #[error("Profile '{0}' not found. Please check the URL.")]
    NotFound(String),

    #[error("Profile service error: {0}")]
    Upstream(String),
}

impl From<reqwest::Error> for ProfileError {
    fn from(e: reqwest::Error) -> Self {
        ProfileError::Upstream(e.to_string())
    }
}

#[async_trait]
pub trait ProfileAnalyzer: Send + Sync {
    /// Multi-line summary of the profile's recent projects and languages.
    async fn analyze_profile(&self, url: &str) -> Result<String, ProfileError>;
}

pub use github::GitHubAnalyzer;
