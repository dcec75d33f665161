use std::time::Duration;

use anyhow::{Context, Result};

use crate::llm_client;
use crate::profile::github;
use crate::retrieval::cache::DEFAULT_DISTANCE_THRESHOLD;

const DEFAULT_EMBEDDING_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_EMBEDDING_DIMS: usize = 1536;

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub openrouter_api_key: String,
    pub llm_model: String,
    pub llm_base_url: String,
    pub github_token: Option<String>,
    pub github_api_url: String,
    /// Cache persists to PostgreSQL when set; in-memory otherwise.
    pub database_url: Option<String>,
    /// Remote embeddings when set; local feature hashing otherwise.
    pub embedding: Option<EmbeddingConfig>,
    pub cache_distance_threshold: f32,
    /// Cap on each cache lookup and store.
    pub cache_timeout: Duration,
    pub generation_timeout: Duration,
    pub port: u16,
    pub rust_log: String,
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub dims: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let optional = |key: &str| get(key).filter(|v| !v.trim().is_empty());
        let or_default = |key: &str, default: &str| optional(key).unwrap_or_else(|| default.to_string());

        let embedding = match optional("EMBEDDING_API_KEY") {
            Some(api_key) => Some(EmbeddingConfig {
                api_key,
                base_url: or_default("EMBEDDING_BASE_URL", DEFAULT_EMBEDDING_BASE_URL),
                model: or_default("EMBEDDING_MODEL", DEFAULT_EMBEDDING_MODEL),
                dims: parse_or("EMBEDDING_DIMS", optional("EMBEDDING_DIMS"), DEFAULT_EMBEDDING_DIMS)?,
            }),
            None => None,
        };

        let cache_distance_threshold = parse_or(
            "CACHE_DISTANCE_THRESHOLD",
            optional("CACHE_DISTANCE_THRESHOLD"),
            DEFAULT_DISTANCE_THRESHOLD,
        )?;
        if !(cache_distance_threshold > 0.0 && cache_distance_threshold <= 2.0) {
            anyhow::bail!("CACHE_DISTANCE_THRESHOLD must be in (0, 2], got {cache_distance_threshold}");
        }

        let cache_timeout_secs: u64 =
            parse_or("CACHE_TIMEOUT_SECS", optional("CACHE_TIMEOUT_SECS"), 5)?;
        if cache_timeout_secs == 0 {
            anyhow::bail!("CACHE_TIMEOUT_SECS must be positive");
        }

        let timeout_secs: u64 = parse_or(
            "GENERATION_TIMEOUT_SECS",
            optional("GENERATION_TIMEOUT_SECS"),
            180,
        )?;
        if timeout_secs == 0 {
            anyhow::bail!("GENERATION_TIMEOUT_SECS must be positive");
        }

        Ok(Config {
            openrouter_api_key: optional("OPENROUTER_API_KEY").with_context(|| {
                "Required environment variable 'OPENROUTER_API_KEY' is not set".to_string()
            })?,
            llm_model: or_default("LLM_MODEL", llm_client::DEFAULT_MODEL),
            llm_base_url: or_default("LLM_BASE_URL", llm_client::DEFAULT_BASE_URL),
            github_token: optional("GITHUB_TOKEN"),
            github_api_url: or_default("GITHUB_API_URL", github::DEFAULT_API_URL),
            database_url: optional("DATABASE_URL"),
            embedding,
            cache_distance_threshold,
            cache_timeout: Duration::from_secs(cache_timeout_secs),
            generation_timeout: Duration::from_secs(timeout_secs),
            port: parse_or("PORT", optional("PORT"), 5000)?,
            rust_log: or_default("RUST_LOG", "info"),
        })
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{value}'")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults_with_only_required_key() {
        let config = load(&[("OPENROUTER_API_KEY", "sk-test")]).unwrap();
        assert_eq!(config.llm_model, llm_client::DEFAULT_MODEL);
        assert_eq!(config.llm_base_url, "https://openrouter.ai/api/v1");
        assert_eq!(config.github_api_url, "https://api.github.com");
        assert!(config.github_token.is_none());
        assert!(config.database_url.is_none());
        assert!(config.embedding.is_none());
        assert_eq!(config.cache_distance_threshold, 0.2);
        assert_eq!(config.cache_timeout, Duration::from_secs(5));
        assert_eq!(config.generation_timeout, Duration::from_secs(180));
        assert_eq!(config.port, 5000);
        assert_eq!(config.rust_log, "info");
    }

    #[test]
    fn test_missing_api_key_fails() {
        let err = load(&[]).unwrap_err();
        assert!(err.to_string().contains("OPENROUTER_API_KEY"));
        assert!(load(&[("OPENROUTER_API_KEY", "  ")]).is_err());
    }

    #[test]
    fn test_embedding_config_enabled_by_api_key() {
        let config = load(&[
            ("OPENROUTER_API_KEY", "sk"),
            ("EMBEDDING_API_KEY", "emb"),
            ("EMBEDDING_MODEL", "nomic-embed-text"),
            ("EMBEDDING_DIMS", "768"),
        ])
        .unwrap();
        let embedding = config.embedding.unwrap();
        assert_eq!(embedding.api_key, "emb");
        assert_eq!(embedding.base_url, "https://api.openai.com/v1");
        assert_eq!(embedding.model, "nomic-embed-text");
        assert_eq!(embedding.dims, 768);
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        assert!(load(&[("OPENROUTER_API_KEY", "sk"), ("PORT", "http")]).is_err());
        assert!(load(&[("OPENROUTER_API_KEY", "sk"), ("CACHE_DISTANCE_THRESHOLD", "0")]).is_err());
        assert!(load(&[("OPENROUTER_API_KEY", "sk"), ("GENERATION_TIMEOUT_SECS", "0")]).is_err());
        assert!(load(&[("OPENROUTER_API_KEY", "sk"), ("CACHE_TIMEOUT_SECS", "0")]).is_err());
    }

    #[test]
    fn test_blank_optional_values_fall_back() {
        let config = load(&[
            ("OPENROUTER_API_KEY", "sk"),
            ("GITHUB_TOKEN", ""),
            ("DATABASE_URL", " "),
            ("PORT", "8081"),
        ])
        .unwrap();
        assert!(config.github_token.is_none());
        assert!(config.database_url.is_none());
        assert_eq!(config.port, 8081);
    }
}
