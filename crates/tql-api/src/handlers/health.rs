//! Health check handlers
//!
//! Author: hephaex@gmail.com

use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

/// Health check response
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub total_requests: u64,
    pub graph: GraphStats,
}

#[derive(Serialize, ToSchema)]
pub struct GraphStats {
    pub engine: String,
    pub nodes: usize,
    pub edges: usize,
    pub endpoints: usize,
}

/// Liveness probe with graph statistics
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_secs(),
        total_requests: state.get_request_count(),
        graph: GraphStats {
            engine: state.inflector.engine().name().to_string(),
            nodes: state.graph.node_count().await,
            edges: state.graph.edge_count().await,
            endpoints: state.config.endpoints.len(),
        },
    })
}
