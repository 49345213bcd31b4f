//! Observability endpoints
//!
//! `/health` for probes and `/metrics` for Prometheus scraping.

use std::sync::Arc;

use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use radioserver_core::session::SessionRegistry;
use serde::Serialize;

#[derive(Clone)]
pub struct HttpState {
    pub registry: Arc<SessionRegistry>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub sessions: usize,
    pub streams: usize,
}

pub fn create_router(registry: Arc<SessionRegistry>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .with_state(HttpState { registry })
}

pub async fn health_check(State(state): State<HttpState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        sessions: state.registry.len(),
        streams: state.registry.streaming_count(),
    })
}

pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        radioserver_core::metrics::gather(),
    )
}
