//! TQL Graph - In-memory property graph
//!
//! A petgraph-backed property graph that speaks a Cypher pattern subset,
//! so templated queries can be rendered and executed without an external
//! database. Also hosts the vocabulary text analysis used by search.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, RwLock};
use tql_core::{fragment_of, Node, Properties, QueryEngine, ReadTransaction, Result, RowStream, TqlError};
use tracing::debug;

pub mod analysis;
mod executor;
pub mod query;
pub mod subsumption;

pub use executor::DEFAULT_TRAVERSAL_BUDGET;
pub use subsumption::EngineSubsumption;

use executor::Executor;

/// Property holding a node's full IRI
pub const IRI_PROPERTY: &str = "iri";

/// Property holding a node's IRI fragment
pub const FRAGMENT_PROPERTY: &str = "fragment";

// ============================================================================
// Storage
// ============================================================================

#[derive(Debug, Clone, Default)]
pub(crate) struct StoredNode {
    pub(crate) labels: Vec<String>,
    pub(crate) properties: Properties,
}

#[derive(Debug, Clone)]
pub(crate) struct StoredEdge {
    pub(crate) rel_type: String,
    pub(crate) properties: Properties,
}

pub(crate) type Store = StableDiGraph<StoredNode, StoredEdge>;

/// Shared in-memory property graph
///
/// Cloning is cheap; clones see the same graph.
#[derive(Debug, Clone)]
pub struct MemoryGraph {
    store: Arc<RwLock<Store>>,
    traversal_budget: usize,
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self {
            store: Arc::default(),
            traversal_budget: DEFAULT_TRAVERSAL_BUDGET,
        }
    }
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a fixture document
    pub fn from_fixture(fixture: &GraphFixture) -> Result<Self> {
        let mut store = Store::default();
        apply_fixture(&mut store, fixture)?;
        Ok(Self {
            store: Arc::new(RwLock::new(store)),
            ..Self::default()
        })
    }

    /// Cap the relationship traversals a single query may perform
    ///
    /// Queries that need more fail with `QueryExecutionFailed`.
    pub fn with_traversal_budget(mut self, budget: usize) -> Self {
        self.traversal_budget = budget;
        self
    }

    pub fn traversal_budget(&self) -> usize {
        self.traversal_budget
    }

    /// Build a graph from a JSON fixture file
    pub fn from_fixture_file(path: impl AsRef<Path>) -> Result<Self> {
        let fixture = GraphFixture::from_file(path)?;
        Self::from_fixture(&fixture)
    }

    /// Add a node, returning its identity
    pub async fn add_node(&self, labels: Vec<String>, properties: Properties) -> u64 {
        let mut store = self.store.write().await;
        store.add_node(StoredNode { labels, properties }).index() as u64
    }

    /// Add a node carrying `iri` and its `fragment`
    pub async fn add_iri_node(&self, iri: &str) -> u64 {
        self.add_node(Vec::new(), iri_properties(iri)).await
    }

    /// Add a relationship between two existing nodes
    pub async fn add_relationship(
        &self,
        start: u64,
        end: u64,
        rel_type: impl Into<String>,
        properties: Properties,
    ) -> Result<u64> {
        let mut store = self.store.write().await;
        let (start, end) = (node_index(start), node_index(end));
        for index in [start, end] {
            if !store.contains_node(index) {
                return Err(TqlError::InvalidGraph(format!(
                    "node {} does not exist",
                    index.index()
                )));
            }
        }
        let edge = store.add_edge(
            start,
            end,
            StoredEdge {
                rel_type: rel_type.into(),
                properties,
            },
        );
        Ok(edge.index() as u64)
    }

    /// Merge a fixture document into the graph
    pub async fn load_fixture(&self, fixture: &GraphFixture) -> Result<()> {
        let mut store = self.store.write().await;
        apply_fixture(&mut store, fixture)
    }

    pub async fn node(&self, id: u64) -> Option<Node> {
        let store = self.store.read().await;
        let index = node_index(id);
        store
            .contains_node(index)
            .then(|| Executor::new(&store).node(index))
    }

    pub async fn node_count(&self) -> usize {
        self.store.read().await.node_count()
    }

    pub async fn edge_count(&self) -> usize {
        self.store.read().await.edge_count()
    }

    /// Nodes whose `field` tokens contain every token of `text`
    ///
    /// Both sides go through the analyzer registered for `field`. Array
    /// properties match when any element does.
    pub async fn search(&self, field: &str, text: &str, limit: usize) -> Vec<Node> {
        let analyzer = analysis::analyzer_for(field);
        let wanted = analyzer.tokens(text);
        if wanted.is_empty() {
            return Vec::new();
        }
        debug!(field, analyzer = analyzer.name(), tokens = ?wanted, "Vocabulary search");

        let store = self.store.read().await;
        let executor = Executor::new(&store);
        let mut indices: Vec<NodeIndex> = store.node_indices().collect();
        indices.sort();

        indices
            .into_iter()
            .filter(|index| {
                let Some(value) = store.node_weight(*index).and_then(|n| n.properties.get(field))
                else {
                    return false;
                };
                property_texts(value).any(|candidate| {
                    let tokens = analyzer.tokens(candidate);
                    wanted.iter().all(|token| tokens.contains(token))
                })
            })
            .take(limit)
            .map(|index| executor.node(index))
            .collect()
    }
}

fn node_index(id: u64) -> NodeIndex {
    NodeIndex::new(id as usize)
}

fn iri_properties(iri: &str) -> Properties {
    let mut properties = Properties::new();
    properties.insert(IRI_PROPERTY.to_string(), iri.into());
    properties.insert(FRAGMENT_PROPERTY.to_string(), fragment_of(iri).into());
    properties
}

fn property_texts(value: &serde_json::Value) -> Box<dyn Iterator<Item = &str> + '_> {
    match value {
        serde_json::Value::String(s) => Box::new(std::iter::once(s.as_str())),
        serde_json::Value::Array(items) => Box::new(items.iter().filter_map(|v| v.as_str())),
        _ => Box::new(std::iter::empty()),
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// JSON graph document used to seed a [`MemoryGraph`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphFixture {
    #[serde(default)]
    pub nodes: Vec<FixtureNode>,
    #[serde(default)]
    pub edges: Vec<FixtureEdge>,
}

/// Fixture node, referenced from edges by `key`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureNode {
    pub key: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub properties: Properties,
    /// Sets the `iri` and `fragment` properties
    #[serde(default)]
    pub iri: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureEdge {
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub rel_type: String,
    #[serde(default)]
    pub properties: Properties,
}

impl GraphFixture {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TqlError::InvalidGraph(format!("cannot read fixture {}: {e}", path.display()))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| TqlError::InvalidGraph(format!("malformed fixture: {e}")))
    }
}

/// Validates the whole fixture before touching the store
fn apply_fixture(store: &mut Store, fixture: &GraphFixture) -> Result<()> {
    let mut keys = HashMap::new();
    for (position, node) in fixture.nodes.iter().enumerate() {
        if keys.insert(node.key.as_str(), position).is_some() {
            return Err(TqlError::InvalidGraph(format!(
                "duplicate node key '{}'",
                node.key
            )));
        }
    }
    for edge in &fixture.edges {
        for key in [&edge.from, &edge.to] {
            if !keys.contains_key(key.as_str()) {
                return Err(TqlError::InvalidGraph(format!(
                    "edge {} -[{}]-> {} references unknown node '{key}'",
                    edge.from, edge.rel_type, edge.to
                )));
            }
        }
    }

    let mut indices = HashMap::new();
    for node in &fixture.nodes {
        let mut properties = node.properties.clone();
        if let Some(iri) = &node.iri {
            for (key, value) in iri_properties(iri) {
                properties.entry(key).or_insert(value);
            }
        }
        let index = store.add_node(StoredNode {
            labels: node.labels.clone(),
            properties,
        });
        indices.insert(node.key.as_str(), index);
    }
    for edge in &fixture.edges {
        store.add_edge(
            indices[edge.from.as_str()],
            indices[edge.to.as_str()],
            StoredEdge {
                rel_type: edge.rel_type.clone(),
                properties: edge.properties.clone(),
            },
        );
    }

    debug!(
        nodes = fixture.nodes.len(),
        edges = fixture.edges.len(),
        "Loaded graph fixture"
    );
    Ok(())
}

// ============================================================================
// Query Engine
// ============================================================================

#[async_trait]
impl QueryEngine for MemoryGraph {
    async fn begin_read(&self) -> Result<Box<dyn ReadTransaction>> {
        let snapshot = self.store.clone().read_owned().await;
        Ok(Box::new(MemoryReadTransaction {
            snapshot,
            traversal_budget: self.traversal_budget,
        }))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Read transaction holding the graph's read lock until dropped
pub struct MemoryReadTransaction {
    snapshot: OwnedRwLockReadGuard<Store>,
    traversal_budget: usize,
}

#[async_trait]
impl ReadTransaction for MemoryReadTransaction {
    async fn execute(&mut self, query: &str) -> Result<RowStream> {
        let parsed = query::parse(query).map_err(|e| {
            TqlError::QueryExecutionFailed(format!("{e} in query: {query}"))
        })?;
        let rows = Executor::new(&self.snapshot)
            .with_budget(self.traversal_budget)
            .run(&parsed)
            .map_err(TqlError::QueryExecutionFailed)?;

        debug!(rows = rows.len(), "Query executed");
        Ok(stream::iter(rows.into_iter().map(Ok)).boxed())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use serde_json::json;
    use tql_core::Cell;

    const FIXTURE: &str = r#"{
        "nodes": [
            {"key": "foo", "iri": "http://x.org/#foo"},
            {"key": "fizz", "iri": "http://x.org/#fizz"},
            {"key": "bar", "iri": "http://x.org/#bar"},
            {"key": "baz", "iri": "http://x.org/#baz"},
            {"key": "1", "iri": "http://x.org/#1", "labels": ["Class"],
             "properties": {"label": "Café source", "synonym": ["first node", "origin"]}},
            {"key": "2", "iri": "http://x.org/#2", "labels": ["Class"],
             "properties": {"label": "The target"}}
        ],
        "edges": [
            {"from": "fizz", "to": "foo", "type": "subPropertyOf"},
            {"from": "baz", "to": "bar", "type": "subPropertyOf"},
            {"from": "1", "to": "2", "type": "fizz"}
        ]
    }"#;

    fn graph() -> MemoryGraph {
        MemoryGraph::from_fixture(&GraphFixture::from_json(FIXTURE).unwrap()).unwrap()
    }

    async fn run(graph: &MemoryGraph, query: &str) -> Result<Vec<tql_core::Row>> {
        let mut tx = graph.begin_read().await?;
        tx.execute(query).await?.try_collect().await
    }

    #[tokio::test]
    async fn test_fixture_loading() {
        let graph = graph();
        assert_eq!(graph.node_count().await, 6);
        assert_eq!(graph.edge_count().await, 3);

        let node = graph.node(4).await.unwrap();
        assert_eq!(node.property("fragment"), Some(&json!("1")));
        assert_eq!(node.property("iri"), Some(&json!("http://x.org/#1")));
        assert_eq!(node.labels, vec!["Class"]);
    }

    #[test]
    fn test_fixture_rejects_unknown_endpoint() {
        let fixture = GraphFixture::from_json(
            r#"{"nodes": [{"key": "a"}], "edges": [{"from": "a", "to": "b", "type": "x"}]}"#,
        )
        .unwrap();
        let err = MemoryGraph::from_fixture(&fixture).unwrap_err();
        assert!(matches!(err, TqlError::InvalidGraph(_)));
    }

    #[test]
    fn test_fixture_rejects_duplicate_key() {
        let fixture =
            GraphFixture::from_json(r#"{"nodes": [{"key": "a"}, {"key": "a"}]}"#).unwrap();
        assert!(MemoryGraph::from_fixture(&fixture).is_err());
    }

    #[tokio::test]
    async fn test_add_relationship_requires_nodes() {
        let graph = MemoryGraph::new();
        let a = graph.add_iri_node("http://x.org/#a").await;
        assert!(graph
            .add_relationship(a, 42, "rel", Properties::new())
            .await
            .is_err());
        let b = graph.add_node(vec!["Class".into()], Properties::new()).await;
        assert!(graph.add_relationship(a, b, "rel", Properties::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_match_all_nodes() {
        let rows = run(&graph(), "MATCH (n) RETURN n").await.unwrap();
        assert_eq!(rows.len(), 6);
    }

    #[tokio::test]
    async fn test_typed_relationship_match() {
        let rows = run(&graph(), "MATCH (n)-[r:foo|fizz]-(m) RETURN n, r, m")
            .await
            .unwrap();

        // Undirected: one row per orientation
        assert_eq!(rows.len(), 2);
        for row in &rows {
            match row.get("r") {
                Some(Cell::Relationship(rel)) => {
                    assert_eq!(rel.rel_type, "fizz");
                    assert_eq!(rel.start.property("fragment"), Some(&json!("1")));
                    assert_eq!(rel.end.property("fragment"), Some(&json!("2")));
                }
                other => panic!("unexpected cell {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_variable_length_path() {
        let rows = run(
            &graph(),
            "MATCH (n {fragment:'foo'})-[path:subPropertyOf*]-(m) RETURN n, path, m",
        )
        .await
        .unwrap();

        assert_eq!(rows.len(), 1);
        match rows[0].get("path") {
            Some(Cell::List(items)) => assert_eq!(items.len(), 1),
            other => panic!("unexpected cell {other:?}"),
        }
    }

    async fn chain(length: usize) -> MemoryGraph {
        let graph = MemoryGraph::new();
        let mut previous = graph.add_iri_node("http://x.org/#n0").await;
        for i in 1..=length {
            let next = graph.add_iri_node(&format!("http://x.org/#n{i}")).await;
            graph
                .add_relationship(next, previous, "subPropertyOf", Properties::new())
                .await
                .unwrap();
            previous = next;
        }
        graph
    }

    async fn clique(size: usize) -> MemoryGraph {
        let graph = MemoryGraph::new();
        let mut ids = Vec::new();
        for i in 0..size {
            ids.push(graph.add_iri_node(&format!("http://x.org/#k{i}")).await);
        }
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                graph
                    .add_relationship(*a, *b, "link", Properties::new())
                    .await
                    .unwrap();
            }
        }
        graph
    }

    #[tokio::test]
    async fn test_unbounded_walk_follows_long_chain() {
        let rows = run(
            &chain(20).await,
            "MATCH (n {fragment:'n0'})<-[path:subPropertyOf*]-(m) RETURN n, path, m",
        )
        .await
        .unwrap();

        assert_eq!(rows.len(), 20);
        let longest = rows
            .iter()
            .filter_map(|row| match row.get("path") {
                Some(Cell::List(items)) => Some(items.len()),
                _ => None,
            })
            .max();
        assert_eq!(longest, Some(20));
        let ends: Vec<_> = rows
            .iter()
            .filter_map(|row| match row.get("m") {
                Some(Cell::Node(node)) => node.property("fragment").cloned(),
                _ => None,
            })
            .collect();
        assert!(ends.contains(&json!("n20")));
    }

    #[tokio::test]
    async fn test_bounded_walk_on_long_chain() {
        let rows = run(
            &chain(20).await,
            "MATCH (n {fragment:'n0'})<-[path:subPropertyOf*3..5]-(m) RETURN m.fragment AS end",
        )
        .await
        .unwrap();
        let ends: Vec<_> = rows.iter().filter_map(|row| row.get("end").cloned()).collect();
        assert_eq!(
            ends,
            vec![
                Cell::Scalar(json!("n3")),
                Cell::Scalar(json!("n4")),
                Cell::Scalar(json!("n5"))
            ]
        );
    }

    #[tokio::test]
    async fn test_dense_walk_within_budget() {
        // 2884 trails leave one corner of a 5-clique
        let rows = run(
            &clique(5).await,
            "MATCH (n {fragment:'k0'})-[r:link*]-(m) RETURN r",
        )
        .await
        .unwrap();
        assert_eq!(rows.len(), 2884);
    }

    #[tokio::test]
    async fn test_dense_walk_exceeds_budget() {
        let started = std::time::Instant::now();
        let err = run(
            &clique(6).await,
            "MATCH (n {fragment:'k0'})-[r:link*]-(m) RETURN n, r, m",
        )
        .await
        .unwrap_err();

        match err {
            TqlError::QueryExecutionFailed(message) => {
                assert!(message.contains("traversal budget"), "{message}")
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(started.elapsed() < std::time::Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_limit_stops_dense_walk_early() {
        let graph = clique(6).await.with_traversal_budget(100);
        let rows = run(
            &graph,
            "MATCH (n {fragment:'k0'})-[r:link*]-(m) RETURN r LIMIT 10",
        )
        .await
        .unwrap();
        assert_eq!(rows.len(), 10);
    }

    #[tokio::test]
    async fn test_custom_traversal_budget() {
        let graph = chain(20).await.with_traversal_budget(5);
        assert_eq!(graph.traversal_budget(), 5);

        let query = "MATCH (n {fragment:'n0'})<-[:subPropertyOf*]-(m) RETURN m";
        assert!(matches!(
            run(&graph, query).await,
            Err(TqlError::QueryExecutionFailed(_))
        ));
        assert_eq!(
            run(&graph.with_traversal_budget(20), query).await.unwrap().len(),
            20
        );
    }

    #[tokio::test]
    async fn test_named_path_and_where() {
        let rows = run(
            &graph(),
            "MATCH p = (a)-[:fizz]->(b) WHERE b.fragment = '2' RETURN p, a.fragment AS source",
        )
        .await
        .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("source"), Some(&Cell::Scalar(json!("1"))));
        match rows[0].get("p") {
            Some(Cell::Path(path)) => {
                assert_eq!(path.len(), 1);
                assert_eq!(path.nodes.len(), 2);
            }
            other => panic!("unexpected cell {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_subsumption_query_shape() {
        let rows = run(
            &graph(),
            "MATCH (parent {`fragment`: 'foo'})<-[:`subPropertyOf`]-(child) \
             RETURN DISTINCT child.`fragment` AS child",
        )
        .await
        .unwrap();
        assert_eq!(rows, vec![tql_core::Row::new(vec![(
            "child".to_string(),
            Cell::Scalar(json!("fizz"))
        )])]);
    }

    #[tokio::test]
    async fn test_invalid_query_is_execution_failure() {
        let err = run(&graph(), "MATCH (n RETURN n").await.unwrap_err();
        assert!(matches!(err, TqlError::QueryExecutionFailed(_)));

        let err = run(&graph(), "MATCH (n) RETURN x").await.unwrap_err();
        assert!(matches!(err, TqlError::QueryExecutionFailed(_)));
    }

    #[tokio::test]
    async fn test_transaction_holds_read_lock() {
        let graph = graph();
        let tx = graph.begin_read().await.unwrap();
        assert!(graph.store.try_write().is_err());
        drop(tx);
        assert!(graph.store.try_write().is_ok());
    }

    #[tokio::test]
    async fn test_search_by_label() {
        let graph = graph();

        let hits = graph.search("label", "cafe", 10).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].property("fragment"), Some(&json!("1")));

        let hits = graph.search("synonym", "Origin", 10).await;
        assert_eq!(hits.len(), 1);

        // Keyword fields match the whole value only
        assert_eq!(graph.search("fragment", "fizz", 10).await.len(), 1);
        assert!(graph.search("fragment", "fiz", 10).await.is_empty());
        assert!(graph.search("label", "the", 10).await.is_empty());
    }
}
