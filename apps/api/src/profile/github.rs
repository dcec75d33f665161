//! GitHub profile analyzer.
//!
//! Fetches the user's most recently pushed public repositories and renders
//! them as a language list plus one line per project. A `GITHUB_TOKEN`, when
//! configured, is sent only to raise the rate limit.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};

use super::{ProfileAnalyzer, ProfileError};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const REPOS_PER_PAGE: u32 = 7;
const USER_AGENT: &str = concat!("roadmap-api/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Deserialize)]
pub struct Repo {
    pub name: Option<String>,
    pub language: Option<String>,
    pub description: Option<String>,
}

#[derive(Clone)]
pub struct GitHubAnalyzer {
    client: Client,
    api_base: String,
    token: Option<String>,
}

impl GitHubAnalyzer {
    pub fn new(api_base: &str, token: Option<String>) -> Result<Self, ProfileError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    async fn fetch_repos(&self, username: &str) -> Result<Vec<Repo>, ProfileError> {
        let url = format!("{}/users/{}/repos", self.api_base, username);
        let per_page = REPOS_PER_PAGE.to_string();

        let mut request = self
            .client
            .get(&url)
            .query(&[("sort", "pushed"), ("per_page", per_page.as_str())])
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("token {token}"));
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(ProfileError::NotFound(username.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProfileError::Upstream(format!("GitHub API returned {status}: {body}")));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl ProfileAnalyzer for GitHubAnalyzer {
    async fn analyze_profile(&self, url: &str) -> Result<String, ProfileError> {
        let username = extract_username(url)?;
        debug!("Fetching repositories for GitHub user '{username}'");

        let repos = self.fetch_repos(username).await?;
        info!("Fetched {} repositories for '{}'", repos.len(), username);

        Ok(summarize_repos(&repos))
    }
}

/// Last non-empty path segment of the profile URL.
pub fn extract_username(url: &str) -> Result<&str, ProfileError> {
    url.trim()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(str::trim)
        .filter(|name| !name.is_empty() && !name.contains(':'))
        .ok_or_else(|| ProfileError::InvalidUrl(url.to_string()))
}

pub fn summarize_repos(repos: &[Repo]) -> String {
    if repos.is_empty() {
        return "No public repositories found for this user.".to_string();
    }

    let mut languages: Vec<&str> = Vec::new();
    for lang in repos.iter().filter_map(|r| r.language.as_deref()) {
        if !languages.contains(&lang) {
            languages.push(lang);
        }
    }
    let languages = if languages.is_empty() {
        "N/A".to_string()
    } else {
        languages.join(", ")
    };

    let mut summary = format!("Key Languages Used:\n- {languages}\n\nRecent Projects Summary:\n");
    for repo in repos {
        summary.push_str(&format!(
            "- Project: {} (Language: {})\n  Description: {}\n",
            repo.name.as_deref().unwrap_or("N/A"),
            repo.language.as_deref().unwrap_or("N/A"),
            repo.description.as_deref().unwrap_or("No description."),
        ));
    }
    summary
}
