//! Materialized result graph
//!
//! Vertices and edges are keyed by engine identity, so repeated sightings of
//! the same node or relationship across rows collapse into one element.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::Properties;

/// A vertex in the result graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub id: u64,
    pub labels: BTreeSet<String>,
    pub properties: Properties,
}

impl Vertex {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            labels: BTreeSet::new(),
            properties: Properties::new(),
        }
    }

    /// Merge labels and properties seen in another sighting of this vertex
    fn merge(&mut self, labels: impl IntoIterator<Item = String>, properties: &Properties) {
        self.labels.extend(labels);
        for (key, value) in properties {
            self.properties
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

/// An edge in the result graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: u64,
    /// Relationship type
    pub label: String,
    pub source: u64,
    pub target: u64,
    pub properties: Properties,
}

/// One element of a returned path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum PathElement {
    Vertex(u64),
    Edge(u64),
}

/// Property graph built from query results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultGraph {
    vertices: BTreeMap<u64, Vertex>,
    edges: BTreeMap<u64, Edge>,
    paths: Vec<Vec<PathElement>>,
}

impl ResultGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a vertex or merge into the existing one with the same id
    pub fn upsert_vertex(
        &mut self,
        id: u64,
        labels: impl IntoIterator<Item = String>,
        properties: &Properties,
    ) {
        self.vertices
            .entry(id)
            .or_insert_with(|| Vertex::new(id))
            .merge(labels, properties);
    }

    /// Insert an edge unless one with the same id is already present
    ///
    /// Both endpoints must already be vertices of the graph.
    pub fn upsert_edge(
        &mut self,
        id: u64,
        label: &str,
        source: u64,
        target: u64,
        properties: &Properties,
    ) {
        debug_assert!(self.vertices.contains_key(&source));
        debug_assert!(self.vertices.contains_key(&target));

        let edge = self.edges.entry(id).or_insert_with(|| Edge {
            id,
            label: label.to_string(),
            source,
            target,
            properties: Properties::new(),
        });
        for (key, value) in properties {
            edge.properties
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }

    /// Record the element order of a returned path
    pub fn push_path(&mut self, elements: Vec<PathElement>) {
        self.paths.push(elements);
    }

    pub fn vertex(&self, id: u64) -> Option<&Vertex> {
        self.vertices.get(&id)
    }

    pub fn edge(&self, id: u64) -> Option<&Edge> {
        self.edges.get(&id)
    }

    /// Vertices in id order
    pub fn vertices(&self) -> impl Iterator<Item = &Vertex> {
        self.vertices.values()
    }

    /// Edges in id order
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn paths(&self) -> &[Vec<PathElement>] {
        &self.paths
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() && self.edges.is_empty()
    }

    /// Serializable snapshot
    pub fn to_document(&self) -> GraphDocument {
        GraphDocument {
            nodes: self.vertices.values().cloned().collect(),
            edges: self.edges.values().cloned().collect(),
            paths: self.paths.clone(),
        }
    }
}

/// Wire form of a [`ResultGraph`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    pub nodes: Vec<Vertex>,
    pub edges: Vec<Edge>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<Vec<PathElement>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: serde_json::Value) -> Properties {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_vertex_merge_keeps_identity() {
        let mut graph = ResultGraph::new();
        graph.upsert_vertex(1, vec!["Class".to_string()], &props(json!({"iri": "a"})));
        graph.upsert_vertex(
            1,
            vec!["Node".to_string()],
            &props(json!({"iri": "ignored", "fragment": "a"})),
        );

        assert_eq!(graph.vertex_count(), 1);
        let vertex = graph.vertex(1).unwrap();
        assert_eq!(vertex.labels.len(), 2);
        assert_eq!(vertex.properties["iri"], json!("a"));
        assert_eq!(vertex.properties["fragment"], json!("a"));
    }

    #[test]
    fn test_edge_dedup() {
        let mut graph = ResultGraph::new();
        let empty = Properties::new();
        graph.upsert_vertex(1, Vec::new(), &empty);
        graph.upsert_vertex(2, Vec::new(), &empty);
        graph.upsert_edge(10, "fizz", 1, 2, &empty);
        graph.upsert_edge(10, "fizz", 1, 2, &empty);

        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.edge(10).unwrap().label, "fizz");
    }

    #[test]
    fn test_document_serialization() {
        let mut graph = ResultGraph::new();
        let empty = Properties::new();
        graph.upsert_vertex(2, Vec::new(), &empty);
        graph.upsert_vertex(1, Vec::new(), &empty);
        graph.upsert_edge(5, "fizz", 1, 2, &empty);
        graph.push_path(vec![
            PathElement::Vertex(1),
            PathElement::Edge(5),
            PathElement::Vertex(2),
        ]);

        let value = serde_json::to_value(graph.to_document()).unwrap();
        assert_eq!(value["nodes"][0]["id"], json!(1));
        assert_eq!(value["edges"][0]["label"], json!("fizz"));
        assert_eq!(value["paths"][0][1], json!({"type": "edge", "id": 5}));
    }

    #[test]
    fn test_empty_paths_omitted() {
        let value = serde_json::to_value(ResultGraph::new().to_document()).unwrap();
        assert!(value.get("paths").is_none());
        assert!(ResultGraph::new().is_empty());
    }
}
