use std::sync::Arc;

use crate::metrics::Metrics;
use crate::roadmap::RoadmapService;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub roadmaps: Arc<RoadmapService>,
    /// "postgres" or "memory"; reported by the health endpoint.
    pub cache_backend: &'static str,
    pub metrics: Metrics,
}
