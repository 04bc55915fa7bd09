//! Application state management
//!
//! Author: hephaex@gmail.com

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tql_core::config::AppConfig;
use tql_core::Result;
use tql_graph::{EngineSubsumption, MemoryGraph};
use tql_inflector::{CurieMap, CypherInflector};

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Server start time
    pub start_time: Instant,
    /// Request counter
    pub request_count: AtomicU64,
    /// Graph served by the templated endpoints
    pub graph: MemoryGraph,
    /// Prefix table, also used to annotate result vertices
    pub curies: Arc<CurieMap>,
    /// Query inflation pipeline over `graph`
    pub inflector: CypherInflector,
}

impl AppState {
    /// Create application state over an existing graph
    pub fn new(config: AppConfig, graph: MemoryGraph) -> Self {
        let curies = Arc::new(CurieMap::new(config.curies.clone()));
        let subsumption = EngineSubsumption::new(graph.clone()).with_schema(
            config.graph.subsumption_type.clone(),
            config.graph.fragment_property.clone(),
        );
        let inflector = CypherInflector::new(
            curies.clone(),
            Arc::new(subsumption),
            Arc::new(graph.clone()),
        )
        .with_policy(config.graph.entailment);

        Self {
            config,
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
            graph,
            curies,
            inflector,
        }
    }

    /// Create application state, loading the configured fixture if any
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let graph = match &config.graph.fixture_path {
            Some(path) => {
                tracing::info!("Loading graph fixture from {}", path.display());
                MemoryGraph::from_fixture_file(path)?
            }
            None => MemoryGraph::new(),
        }
        .with_traversal_budget(config.graph.traversal_budget);
        Ok(Self::new(config, graph))
    }

    /// Increment request counter
    pub fn increment_requests(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::SeqCst)
    }

    /// Get total request count
    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(AppConfig::default(), MemoryGraph::new())
    }
}
