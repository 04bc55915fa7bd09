//! TQL API Server
//!
//! REST API server for templated graph queries.
//!
//! Author: hephaex@gmail.com

use std::sync::Arc;
use tql_api::{create_router, state::AppState};
use tql_core::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "tql_api={level},tql_inflector={level},tql_graph={level},tower_http=debug",
            level = config.logging.level
        )
        .into()
    });
    if config.logging.json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);

    // Create application state
    let state = Arc::new(AppState::from_config(config)?);
    tracing::info!(
        "Graph loaded: {} nodes, {} relationships",
        state.graph.node_count().await,
        state.graph.edge_count().await
    );
    for endpoint in &state.config.endpoints {
        tracing::info!("Endpoint /api/v1/dynamic/{}", endpoint.path.trim_matches('/'));
    }

    // Create router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("TQL API Server starting on http://{}", addr);
    tracing::info!("OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
