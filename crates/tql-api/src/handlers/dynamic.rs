//! Templated query endpoints
//!
//! Each configured endpoint gets its own GET route. The query string (with
//! repeated keys kept in order) and the route's path captures form the
//! parameter map for the endpoint's template.
//!
//! Author: hephaex@gmail.com

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, RawQuery, State},
    response::IntoResponse,
    routing::{get, MethodRouter},
    Json,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tql_core::config::EndpointConfig;
use tql_core::result::{Edge, PathElement, ResultGraph, Vertex};
use tql_core::ParameterMap;
use tql_inflector::CurieMap;

/// Result vertex with its compact identifier
#[derive(Debug, Serialize)]
pub struct VertexView {
    #[serde(flatten)]
    pub vertex: Vertex,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub curie: Option<String>,
}

/// Result graph document
#[derive(Debug, Serialize)]
pub struct GraphResponse {
    pub nodes: Vec<VertexView>,
    pub edges: Vec<Edge>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<Vec<PathElement>>,
}

impl GraphResponse {
    pub fn new(graph: &ResultGraph, curies: &CurieMap) -> Self {
        let nodes = graph
            .vertices()
            .map(|vertex| VertexView {
                curie: vertex
                    .properties
                    .get(tql_graph::IRI_PROPERTY)
                    .and_then(|iri| iri.as_str())
                    .and_then(|iri| curies.get_curie(iri)),
                vertex: vertex.clone(),
            })
            .collect();

        Self {
            nodes,
            edges: graph.edges().cloned().collect(),
            paths: graph.paths().to_vec(),
        }
    }
}

/// GET route serving one configured endpoint
pub fn endpoint_route(endpoint: &EndpointConfig) -> MethodRouter<Arc<AppState>> {
    let endpoint = Arc::new(endpoint.clone());
    get(
        move |State(state): State<Arc<AppState>>,
              captures: Option<Path<HashMap<String, String>>>,
              RawQuery(query): RawQuery| {
            let endpoint = endpoint.clone();
            async move {
                let captures = captures.map(|Path(captures)| captures).unwrap_or_default();
                run_endpoint(state, &endpoint, captures, query.as_deref()).await
            }
        },
    )
}

/// Build the parameter map for one request
///
/// Path captures replace query-string values of the same name.
pub fn request_parameters(
    query: Option<&str>,
    captures: HashMap<String, String>,
) -> ParameterMap {
    let mut params = ParameterMap::new();
    if let Some(query) = query {
        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            params.insert(name.into_owned(), value.into_owned());
        }
    }
    for (name, value) in captures {
        params.insert_all(name, [value]);
    }
    params
}

async fn run_endpoint(
    state: Arc<AppState>,
    endpoint: &EndpointConfig,
    captures: HashMap<String, String>,
    query: Option<&str>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    let params = request_parameters(query, captures);
    tracing::debug!(
        "Endpoint {} called with {} parameters",
        endpoint.path,
        params.len()
    );

    let graph = state.inflector.inflate(&endpoint.query, &params).await?;
    Ok(Json(GraphResponse::new(&graph, &state.curies)))
}
