//! API route definitions
//!
//! Author: hephaex@gmail.com

use crate::handlers::{dynamic, endpoints, vocabulary};
use crate::state::AppState;
use axum::{routing::get, Router};
use std::sync::Arc;
use tql_core::config::EndpointConfig;

/// Mount point of the templated endpoints
pub const DYNAMIC_PREFIX: &str = "/api/v1/dynamic";

/// Create API v1 routes
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/endpoints", get(endpoints::list_endpoints))
        .route("/vocabulary/search", get(vocabulary::search_vocabulary))
}

/// One route per configured templated endpoint
pub fn dynamic_routes(configured: &[EndpointConfig]) -> Router<Arc<AppState>> {
    configured.iter().fold(Router::new(), |router, endpoint| {
        let path = format!("/{}", endpoint.path.trim_matches('/'));
        tracing::debug!("Mounting templated endpoint {}{}", DYNAMIC_PREFIX, path);
        router.route(&path, dynamic::endpoint_route(endpoint))
    })
}
