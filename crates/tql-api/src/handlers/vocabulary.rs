//! Vocabulary search
//!
//! Author: hephaex@gmail.com

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tql_graph::analysis;
use utoipa::{IntoParams, ToSchema};

/// Query parameters for vocabulary search
#[derive(Debug, Deserialize, IntoParams)]
pub struct SearchQuery {
    /// Text to match
    pub text: String,

    /// Node property to search
    #[param(default = "label")]
    pub field: Option<String>,

    /// Limit results
    #[param(default = 20)]
    pub limit: Option<usize>,
}

/// One matching vocabulary term
#[derive(Debug, Serialize, ToSchema)]
pub struct VocabularyHit {
    pub id: u64,
    pub labels: Vec<String>,
    pub fragment: Option<String>,
    pub curie: Option<String>,
    #[schema(value_type = Object)]
    pub properties: serde_json::Value,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VocabularySearchResponse {
    pub field: String,
    pub analyzer: String,
    pub total: usize,
    pub hits: Vec<VocabularyHit>,
}

/// Search node properties with the field's analyzer
#[utoipa::path(
    get,
    path = "/api/v1/vocabulary/search",
    tag = "vocabulary",
    params(SearchQuery),
    responses(
        (status = 200, description = "Matching terms", body = VocabularySearchResponse),
        (status = 400, description = "Empty search text")
    )
)]
pub async fn search_vocabulary(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQuery>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    if params.text.trim().is_empty() {
        return Err(AppError::BadRequest("Search text is empty".to_string()));
    }

    let field = params.field.unwrap_or_else(|| "label".to_string());
    let limit = params.limit.unwrap_or(20).min(1000); // Cap at 1000

    let hits: Vec<VocabularyHit> = state
        .graph
        .search(&field, &params.text, limit)
        .await
        .into_iter()
        .map(|node| {
            let iri = node
                .property(tql_graph::IRI_PROPERTY)
                .and_then(|v| v.as_str())
                .map(str::to_string);
            VocabularyHit {
                id: node.id,
                fragment: node
                    .property(tql_graph::FRAGMENT_PROPERTY)
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
                curie: iri.as_deref().and_then(|iri| state.curies.get_curie(iri)),
                labels: node.labels,
                properties: serde_json::Value::Object(node.properties),
            }
        })
        .collect();

    Ok(Json(VocabularySearchResponse {
        analyzer: analysis::analyzer_for(&field).name().to_string(),
        field,
        total: hits.len(),
        hits,
    }))
}
