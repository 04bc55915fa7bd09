//! Templated endpoint listing
//!
//! Author: hephaex@gmail.com

use crate::routes::DYNAMIC_PREFIX;
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;
use tql_core::config::EndpointConfig;
use tql_inflector::template;
use utoipa::ToSchema;

/// One configured templated endpoint
#[derive(Debug, Serialize, ToSchema)]
pub struct EndpointInfo {
    /// Full route, with `:name` path captures
    pub route: String,
    pub summary: Option<String>,
    pub template: String,
    /// Placeholder names the template expects
    pub parameters: Vec<String>,
    /// Whether the template expands relationship types
    pub entailment: bool,
}

impl EndpointInfo {
    pub fn from_config(endpoint: &EndpointConfig) -> Self {
        let scan = template::scan(&endpoint.query);
        let mut parameters: Vec<String> = Vec::new();
        for placeholder in scan.placeholders {
            if !parameters.contains(&placeholder.name) {
                parameters.push(placeholder.name);
            }
        }

        Self {
            route: format!("{DYNAMIC_PREFIX}/{}", endpoint.path.trim_matches('/')),
            summary: endpoint.summary.clone(),
            template: endpoint.query.clone(),
            parameters,
            entailment: scan.segments.iter().any(|s| s.is_entailed()),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EndpointListResponse {
    pub endpoints: Vec<EndpointInfo>,
    pub total: usize,
}

/// List the templated endpoints
#[utoipa::path(
    get,
    path = "/api/v1/endpoints",
    tag = "endpoints",
    responses(
        (status = 200, description = "Configured endpoints", body = EndpointListResponse)
    )
)]
pub async fn list_endpoints(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.increment_requests();

    let endpoints: Vec<EndpointInfo> = state
        .config
        .endpoints
        .iter()
        .map(EndpointInfo::from_config)
        .collect();

    Json(EndpointListResponse {
        total: endpoints.len(),
        endpoints,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_info() {
        let info = EndpointInfo::from_config(&EndpointConfig {
            path: "/neighbours/:id/".to_string(),
            query: "MATCH (n {fragment: '${id}'})-[r:${rel}!]-(m) WHERE m.x = '${id}' RETURN n"
                .to_string(),
            summary: None,
        });

        assert_eq!(info.route, "/api/v1/dynamic/neighbours/:id");
        assert_eq!(info.parameters, vec!["id", "rel"]);
        assert!(info.entailment);
    }
}
