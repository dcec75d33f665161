//! Axum route handlers for the Roadmap API.

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::Serialize;

use crate::errors::AppError;
use crate::retrieval::cache::CacheStats;
use crate::roadmap::generator::{RoadmapRequest, Sourced};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct RoadmapResponse {
    /// Generated document exactly as produced or stored.
    pub document: String,
    pub sourced: Sourced,
    /// Display text; carries the cache annotation when `sourced` is `cache`.
    pub roadmap: String,
}

/// POST /generate_roadmap
/// POST /api/v1/roadmaps
///
/// Returns a cached roadmap for a near-identical goal/stack, otherwise
/// generates one from the profile summary and market context.
pub async fn handle_generate_roadmap(
    State(state): State<AppState>,
    body: Result<Json<RoadmapRequest>, JsonRejection>,
) -> Result<Json<RoadmapResponse>, AppError> {
    let Json(request) =
        body.map_err(|e| AppError::Validation(format!("Invalid request body: {}", e.body_text())))?;

    let roadmap = state.roadmaps.generate(request).await?;

    Ok(Json(RoadmapResponse {
        roadmap: roadmap.display_text(),
        document: roadmap.document,
        sourced: roadmap.sourced,
    }))
}

/// GET /api/v1/cache/stats
pub async fn handle_cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.roadmaps.cache_stats().await)
}
