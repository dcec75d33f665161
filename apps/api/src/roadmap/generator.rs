//! Roadmap Generation — orchestrates one request end to end.
//!
//! Flow: validate → cache probe → (hit: respond) |
//!       (miss: profile analysis ∥ market context → prompt → LLM generate →
//!        cache store → respond).
//!
//! No state is shared between requests except the two vector indexes, which
//! serialize their own writes. The cache store runs on a detached task, so
//! a slow cache never delays the response.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::llm_client::{LlmError, TextGenerator};
use crate::profile::ProfileAnalyzer;
use crate::retrieval::cache::CacheStats;
use crate::retrieval::{GenerationCache, KnowledgeRetriever};
use crate::roadmap::prompts::build_roadmap_prompt;

/// Prefix on display text for roadmaps served from the cache.
pub const CACHE_ANNOTATION: &str = "**[Loaded from Database Cache]**\n\n";

pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(180);

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

/// Request body for roadmap generation. Missing fields deserialize as empty
/// and are rejected by validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoadmapRequest {
    #[serde(default)]
    pub github_url: String,
    #[serde(default)]
    pub career_goal: String,
    #[serde(default)]
    pub preferred_stack: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sourced {
    Cache,
    Fresh,
}

#[derive(Debug, Clone)]
pub struct Roadmap {
    pub document: String,
    pub sourced: Sourced,
}

impl Roadmap {
    /// The document as shown to users; cache-sourced output is annotated.
    pub fn display_text(&self) -> String {
        match self.sourced {
            Sourced::Cache => format!("{CACHE_ANNOTATION}{}", self.document),
            Sourced::Fresh => self.document.clone(),
        }
    }
}

/// Lifecycle of a single request. Logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    CacheProbe,
    CacheHit,
    CacheMiss,
    ContextGather,
    Generate,
    CacheStore,
    Respond,
}

// ────────────────────────────────────────────────────────────────────────────
// Service
// ────────────────────────────────────────────────────────────────────────────

/// Owns the collaborators for roadmap generation. Constructed once at
/// startup and shared through `AppState`.
pub struct RoadmapService {
    cache: GenerationCache,
    knowledge: KnowledgeRetriever,
    profiles: Arc<dyn ProfileAnalyzer>,
    generator: Arc<dyn TextGenerator>,
    generation_timeout: Duration,
}

impl RoadmapService {
    pub fn new(
        cache: GenerationCache,
        knowledge: KnowledgeRetriever,
        profiles: Arc<dyn ProfileAnalyzer>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            cache,
            knowledge,
            profiles,
            generator,
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
        }
    }

    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Runs the request state machine. Any error is terminal for the request.
    pub async fn generate(&self, request: RoadmapRequest) -> Result<Roadmap, AppError> {
        let mut stage = Stage::Received;
        let result = self.run(request, &mut stage).await;
        if let Err(e) = &result {
            warn!("Roadmap request failed during {:?}: {}", stage, e);
        }
        result
    }

    async fn run(&self, request: RoadmapRequest, stage: &mut Stage) -> Result<Roadmap, AppError> {
        let github_url = request.github_url.trim();
        let career_goal = request.career_goal.trim();
        let preferred_stack = request.preferred_stack.as_deref().unwrap_or("").trim();

        if github_url.is_empty() || career_goal.is_empty() {
            return Err(AppError::Validation(
                "Missing required fields: github_url and career_goal".to_string(),
            ));
        }
        info!("Received roadmap request for goal '{career_goal}'");

        advance(stage, Stage::CacheProbe);
        if let Some(entry) = self.cache.lookup(career_goal, preferred_stack).await {
            advance(stage, Stage::CacheHit);
            advance(stage, Stage::Respond);
            return Ok(Roadmap {
                document: entry.text,
                sourced: Sourced::Cache,
            });
        }
        advance(stage, Stage::CacheMiss);

        advance(stage, Stage::ContextGather);
        let (profile_summary, market_context) = tokio::join!(
            self.profiles.analyze_profile(github_url),
            self.knowledge.get_market_context(career_goal),
        );
        let profile_summary = profile_summary?;
        let market_context = market_context?;

        advance(stage, Stage::Generate);
        let prompt =
            build_roadmap_prompt(&profile_summary, career_goal, preferred_stack, &market_context);
        let document = match tokio::time::timeout(
            self.generation_timeout,
            self.generator.complete(&prompt),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => return Err(LlmError::Timeout(self.generation_timeout).into()),
        };
        info!("Roadmap generated ({} chars)", document.len());

        advance(stage, Stage::CacheStore);
        self.cache.store_detached(
            career_goal.to_string(),
            preferred_stack.to_string(),
            document.clone(),
        );

        advance(stage, Stage::Respond);
        Ok(Roadmap {
            document,
            sourced: Sourced::Fresh,
        })
    }
}

fn advance(stage: &mut Stage, next: Stage) {
    debug!("Roadmap request {:?} → {:?}", stage, next);
    *stage = next;
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
