mod config;
mod db;
mod errors;
mod llm_client;
mod metrics;
mod profile;
mod retrieval;
mod roadmap;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::llm_client::LlmClient;
use crate::metrics::Metrics;
use crate::profile::GitHubAnalyzer;
use crate::retrieval::embedding::{Embedder, HashingEmbedder, RemoteEmbedder};
use crate::retrieval::memory::InMemoryIndex;
use crate::retrieval::postgres::PgVectorIndex;
use crate::retrieval::{GenerationCache, KnowledgeRetriever, VectorIndex};
use crate::roadmap::RoadmapService;
use crate::routes::build_router;
use crate::state::AppState;

const KNOWLEDGE_COLLECTION: &str = "job_roles_knowledge";
const CACHE_COLLECTION: &str = "project_roadmaps";

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("roadmap_api={}", &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Roadmap API v{}", env!("CARGO_PKG_VERSION"));

    // Embedding function shared by both indexes
    let embedder: Arc<dyn Embedder> = match &config.embedding {
        Some(emb) => Arc::new(RemoteEmbedder::new(
            emb.api_key.clone(),
            &emb.base_url,
            emb.model.clone(),
            emb.dims,
        )?),
        None => Arc::new(HashingEmbedder::new()),
    };
    info!(
        "Embedder initialized (model: {}, dims: {})",
        embedder.model_name(),
        embedder.dims()
    );

    let metrics = Metrics::new()?;

    // Knowledge corpus is static and always rebuilt in memory
    let knowledge = KnowledgeRetriever::new(Arc::new(InMemoryIndex::new(
        KNOWLEDGE_COLLECTION,
        embedder.clone(),
    )));
    let added = knowledge.initialize().await?;
    info!("Knowledge index ready ({added} documents added)");

    // Generation cache: PostgreSQL when configured, in-memory otherwise
    let (cache_index, cache_backend): (Arc<dyn VectorIndex>, &'static str) =
        match &config.database_url {
            Some(url) => {
                let pool = create_pool(url).await?;
                let index = PgVectorIndex::open(pool, CACHE_COLLECTION, embedder.clone()).await?;
                (Arc::new(index), "postgres")
            }
            None => (
                Arc::new(InMemoryIndex::new(CACHE_COLLECTION, embedder.clone())),
                "memory",
            ),
        };
    let cache = GenerationCache::new(cache_index, metrics.cache_counters())
        .with_threshold(config.cache_distance_threshold)
        .with_timeout(config.cache_timeout);
    info!(
        "Generation cache initialized (backend: {}, threshold: {})",
        cache_backend,
        cache.threshold()
    );

    // Initialize LLM client
    let llm = LlmClient::new(
        config.openrouter_api_key.clone(),
        &config.llm_base_url,
        config.llm_model.clone(),
    )?;
    info!("LLM client initialized (model: {})", llm.model());

    let profiles = GitHubAnalyzer::new(&config.github_api_url, config.github_token.clone())?;
    if config.github_token.is_none() {
        info!("GITHUB_TOKEN not set; profile requests are unauthenticated");
    }

    let roadmaps = RoadmapService::new(cache, knowledge, Arc::new(profiles), Arc::new(llm))
        .with_generation_timeout(config.generation_timeout);

    // Build app state
    let state = AppState {
        roadmaps: Arc::new(roadmaps),
        cache_backend,
        metrics,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
