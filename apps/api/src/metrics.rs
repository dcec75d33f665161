//! Prometheus metrics served at `GET /metrics`.
//!
//! HTTP request counts and latency are recorded by [`track_metrics`], a
//! route layer keyed by the matched route template. Cache outcomes are
//! counted by [`CacheCounters`], which the generation cache owns a clone of.

use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

use crate::errors::AppError;
use crate::state::AppState;

const NAMESPACE: &str = "roadmap_api";

/// Cache outcome counters. Clones share the same underlying values.
#[derive(Clone)]
pub struct CacheCounters {
    pub hits: IntCounter,
    pub misses: IntCounter,
    pub store_failures: IntCounter,
}

impl CacheCounters {
    pub fn new() -> Result<Self, prometheus::Error> {
        Ok(Self {
            hits: IntCounter::with_opts(
                Opts::new("cache_hits_total", "Lookups served from the generation cache")
                    .namespace(NAMESPACE),
            )?,
            misses: IntCounter::with_opts(
                Opts::new("cache_misses_total", "Lookups that fell through to generation")
                    .namespace(NAMESPACE),
            )?,
            store_failures: IntCounter::with_opts(
                Opts::new("cache_store_failures_total", "Generated roadmaps that were not cached")
                    .namespace(NAMESPACE),
            )?,
        })
    }
}

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    http_requests: IntCounterVec,
    http_duration: HistogramVec,
    cache: CacheCounters,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests = IntCounterVec::new(
            Opts::new("http_requests_total", "HTTP requests by route and status")
                .namespace(NAMESPACE),
            &["method", "route", "status"],
        )?;
        let http_duration = HistogramVec::new(
            HistogramOpts::new("http_request_duration_seconds", "HTTP request latency")
                .namespace(NAMESPACE)
                .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 180.0]),
            &["method", "route"],
        )?;
        let cache = CacheCounters::new()?;

        registry.register(Box::new(http_requests.clone()))?;
        registry.register(Box::new(http_duration.clone()))?;
        registry.register(Box::new(cache.hits.clone()))?;
        registry.register(Box::new(cache.misses.clone()))?;
        registry.register(Box::new(cache.store_failures.clone()))?;

        Ok(Self {
            registry,
            http_requests,
            http_duration,
            cache,
        })
    }

    /// Counters to hand to the generation cache.
    pub fn cache_counters(&self) -> CacheCounters {
        self.cache.clone()
    }

    pub fn observe_request(&self, method: &str, route: &str, status: u16, seconds: f64) {
        self.http_requests
            .with_label_values(&[method, route, &status.to_string()])
            .inc();
        self.http_duration
            .with_label_values(&[method, route])
            .observe(seconds);
    }

    /// Text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Route layer recording one count and one latency sample per request.
pub async fn track_metrics(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let response = next.run(request).await;

    state.metrics.observe_request(
        &method,
        &route,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<AppState>) -> Result<Response, AppError> {
    let body = state
        .metrics
        .render()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("metrics encoding failed: {e}")))?;
    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response())
}
