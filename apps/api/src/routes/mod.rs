pub mod health;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::metrics::{metrics_handler, track_metrics};
use crate::roadmap::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/metrics", get(metrics_handler))
        // Legacy path kept for existing clients
        .route("/generate_roadmap", post(handlers::handle_generate_roadmap))
        .route("/api/v1/roadmaps", post(handlers::handle_generate_roadmap))
        .route("/api/v1/cache/stats", get(handlers::handle_cache_stats))
        .route_layer(middleware::from_fn_with_state(state.clone(), track_metrics))
        .with_state(state)
}
