//! TQL API - REST server for templated graph queries
//!
//! Serves each configured query template as a GET endpoint below
//! `/api/v1/dynamic/`, plus endpoint discovery, vocabulary search and the
//! OpenAPI document.
//!
//! Author: hephaex@gmail.com

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

use axum::{
    extract::State,
    http::{HeaderValue, Method},
    routing::get,
    Json, Router,
};
use state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tql_core::config::{AppConfig, EndpointConfig, ServerConfig};
use tql_inflector::template;
use utoipa::openapi::path::{
    OperationBuilder, ParameterBuilder, ParameterIn, PathItem, PathItemType,
};
use utoipa::openapi::{Required, ResponseBuilder};
use utoipa::OpenApi;

/// Static part of the OpenAPI document
#[derive(OpenApi)]
#[openapi(
    info(title = "TQL API", description = "Templated graph queries"),
    paths(
        handlers::health::health_check,
        handlers::endpoints::list_endpoints,
        handlers::vocabulary::search_vocabulary,
    ),
    components(schemas(
        error::ApiError,
        handlers::health::HealthResponse,
        handlers::health::GraphStats,
        handlers::endpoints::EndpointInfo,
        handlers::endpoints::EndpointListResponse,
        handlers::vocabulary::VocabularyHit,
        handlers::vocabulary::VocabularySearchResponse,
    )),
    tags(
        (name = "health", description = "Service health"),
        (name = "endpoints", description = "Templated endpoint discovery"),
        (name = "vocabulary", description = "Vocabulary search"),
        (name = "dynamic", description = "Templated graph queries"),
    )
)]
pub struct ApiDoc;

/// OpenAPI document including one operation per templated endpoint
pub fn openapi_document(endpoints: &[EndpointConfig]) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();

    for endpoint in endpoints {
        let path = endpoint.path.trim_matches('/');
        let captures: Vec<&str> = path
            .split('/')
            .filter_map(|segment| segment.strip_prefix(':'))
            .collect();
        let openapi_path = path
            .split('/')
            .map(|segment| match segment.strip_prefix(':') {
                Some(name) => format!("{{{name}}}"),
                None => segment.to_string(),
            })
            .collect::<Vec<_>>()
            .join("/");

        let mut operation = OperationBuilder::new()
            .tag("dynamic")
            .summary(endpoint.summary.clone())
            .description(Some(endpoint.query.clone()))
            .response(
                "200",
                ResponseBuilder::new().description("Result graph").build(),
            )
            .response(
                "400",
                ResponseBuilder::new()
                    .description("Unresolved CURIE or missing parameter")
                    .build(),
            );

        for name in &captures {
            operation = operation.parameter(
                ParameterBuilder::new()
                    .name(*name)
                    .parameter_in(ParameterIn::Path)
                    .required(Required::True)
                    .build(),
            );
        }
        let mut seen: Vec<String> = captures.iter().map(|c| c.to_string()).collect();
        for placeholder in template::scan(&endpoint.query).placeholders {
            if seen.contains(&placeholder.name) {
                continue;
            }
            operation = operation.parameter(
                ParameterBuilder::new()
                    .name(placeholder.name.clone())
                    .parameter_in(ParameterIn::Query)
                    .required(Required::True)
                    .description(Some("May be repeated; CURIEs are resolved"))
                    .build(),
            );
            seen.push(placeholder.name);
        }

        doc.paths.paths.insert(
            format!("{}/{openapi_path}", routes::DYNAMIC_PREFIX),
            PathItem::new(PathItemType::Get, operation.build()),
        );
    }
    doc
}

async fn openapi_json(State(state): State<Arc<AppState>>) -> Json<utoipa::openapi::OpenApi> {
    Json(openapi_document(&state.config.endpoints))
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let origin = if config.cors_origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            config
                .cors_origins
                .iter()
                .filter_map(|origin| origin.parse::<HeaderValue>().ok()),
        )
    };
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET])
}

/// Build the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let server = &state.config.server;

    let mut api = routes::api_routes();
    if !state.config.endpoints.is_empty() {
        api = api.nest("/dynamic", routes::dynamic_routes(&state.config.endpoints));
    }

    let mut router = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/api-docs/openapi.json", get(openapi_json))
        .nest("/api/v1", api)
        .layer(TimeoutLayer::new(Duration::from_secs(
            server.request_timeout_secs,
        )))
        .layer(TraceLayer::new_for_http());
    if server.cors_enabled {
        router = router.layer(cors_layer(server));
    }

    router.with_state(state)
}

/// Router over the bundled sample graph and endpoint table
pub fn create_router_for_testing() -> Router {
    create_router(Arc::new(testing_state()))
}

/// State over the bundled sample graph and endpoint table
pub fn testing_state() -> AppState {
    let config = AppConfig::from_toml_str(include_str!("../../../fixtures/tql.toml"))
        .unwrap_or_default();
    let graph = tql_graph::GraphFixture::from_json(include_str!(
        "../../../fixtures/relations.json"
    ))
    .and_then(|fixture| tql_graph::MemoryGraph::from_fixture(&fixture))
    .unwrap_or_default();
    AppState::new(config, graph)
}
