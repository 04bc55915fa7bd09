//! TQL Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout the TQL system:
//! - Request parameters and their flattened substitution values
//! - Row cells returned by a query engine (nodes, relationships, paths)
//! - The materialized result graph
//! - Common error types
//! - Traits for the collaborators the inflation pipeline consumes
//! - Configuration management

pub mod config;
pub mod result;

pub use config::{
    AppConfig, ConfigError, EndpointConfig, EntailmentPolicy, GraphConfig, LoggingConfig,
    ServerConfig,
};
pub use result::{Edge, GraphDocument, PathElement, ResultGraph, Vertex};

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for TQL operations
#[derive(Error, Debug)]
pub enum TqlError {
    #[error("Unresolved CURIE: {0}")]
    UnresolvedCurie(String),

    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Query execution failed: {0}")]
    QueryExecutionFailed(String),

    #[error("Invalid graph data: {0}")]
    InvalidGraph(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TqlError {
    /// Whether the error was caused by the request rather than the server
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::UnresolvedCurie(_) | Self::MissingParameter(_))
    }
}

impl From<ConfigError> for TqlError {
    fn from(err: ConfigError) -> Self {
        Self::ConfigError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TqlError>;

// ============================================================================
// Request Parameters
// ============================================================================

/// Multi-valued request parameters
///
/// Keys are unordered; the values of one key keep insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterMap {
    entries: HashMap<String, Vec<String>>,
}

impl ParameterMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one value to a parameter
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries
            .entry(name.into())
            .or_default()
            .push(value.into());
    }

    /// Replace all values of a parameter
    pub fn insert_all<I, V>(&mut self, name: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.entries
            .insert(name.into(), values.into_iter().map(Into::into).collect());
    }

    /// Builder form of [`ParameterMap::insert`]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for ParameterMap
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (name, value) in iter {
            map.insert(name, value);
        }
        map
    }
}

/// A flattened substitution value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Single(String),
    Many(Vec<String>),
}

impl ParamValue {
    /// All values in order
    pub fn values(&self) -> &[String] {
        match self {
            Self::Single(value) => std::slice::from_ref(value),
            Self::Many(values) => values,
        }
    }

    /// Render for a query, joining list values with `separator`
    pub fn join(&self, separator: &str) -> String {
        match self {
            Self::Single(value) => value.clone(),
            Self::Many(values) => values.join(separator),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(values: Vec<String>) -> Self {
        Self::Many(values)
    }
}

/// Parameter name -> substitution value
pub type FlattenedParams = HashMap<String, ParamValue>;

/// Trailing fragment of an IRI: the text after its last `#` or `/`
///
/// An IRI ending in a separator is returned whole.
pub fn fragment_of(iri: &str) -> &str {
    match iri.rfind(|c: char| c == '#' || c == '/') {
        Some(pos) if pos + 1 < iri.len() => &iri[pos + 1..],
        Some(_) => iri,
        None => iri,
    }
}

// ============================================================================
// Query Result Rows
// ============================================================================

/// Property map carried by nodes and relationships
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// A node as returned by a query engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Engine identity
    pub id: u64,

    /// Node labels
    pub labels: Vec<String>,

    /// Property values
    pub properties: Properties,
}

impl Node {
    /// Create a node without labels or properties
    pub fn new(id: u64) -> Self {
        Self {
            id,
            labels: Vec::new(),
            properties: Properties::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    pub fn with_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn property(&self, name: &str) -> Option<&serde_json::Value> {
        self.properties.get(name)
    }
}

/// A relationship as returned by a query engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Engine identity
    pub id: u64,

    /// Relationship type
    pub rel_type: String,

    /// Start node
    pub start: Node,

    /// End node
    pub end: Node,

    /// Property values
    pub properties: Properties,
}

/// An alternating node/relationship sequence
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Path {
    /// Nodes in traversal order, one more than `relationships`
    pub nodes: Vec<Node>,

    /// Relationships in traversal order
    pub relationships: Vec<Relationship>,
}

impl Path {
    /// Length in relationships
    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }
}

/// One typed value in a result row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Cell {
    Node(Node),
    Relationship(Relationship),
    Path(Path),
    List(Vec<Cell>),
    Scalar(serde_json::Value),
}

/// One result row: named cells in RETURN order
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Row {
    pub fields: Vec<(String, Cell)>,
}

impl Row {
    pub fn new(fields: Vec<(String, Cell)>) -> Self {
        Self { fields }
    }

    /// Cell by column name
    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, cell)| cell)
    }

    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.fields.iter().map(|(_, cell)| cell)
    }
}

/// Stream of rows produced by one query
pub type RowStream = BoxStream<'static, Result<Row>>;

// ============================================================================
// Traits
// ============================================================================

/// Maps a compact identifier to the canonical IRIs it denotes
///
/// An empty set means the prefix or identifier is unknown.
pub trait CurieResolver: Send + Sync {
    fn get_full_uri(&self, curie: &str) -> BTreeSet<String>;
}

/// One-hop reverse lookup over the relationship-type subsumption relation
#[async_trait::async_trait]
pub trait SubsumptionLookup: Send + Sync {
    /// Names of the types declared as direct sub-types of `type_name`
    async fn find_subsumption_sources(&self, type_name: &str) -> Result<BTreeSet<String>>;
}

/// A graph query engine
#[async_trait::async_trait]
pub trait QueryEngine: Send + Sync {
    /// Open a read transaction; it is released when dropped
    async fn begin_read(&self) -> Result<Box<dyn ReadTransaction>>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// A read transaction scoped to one request
#[async_trait::async_trait]
pub trait ReadTransaction: Send {
    /// Execute a query; parse and runtime failures are `QueryExecutionFailed`
    async fn execute(&mut self, query: &str) -> Result<RowStream>;
}

impl<T: CurieResolver + ?Sized> CurieResolver for Arc<T> {
    fn get_full_uri(&self, curie: &str) -> BTreeSet<String> {
        (**self).get_full_uri(curie)
    }
}

#[async_trait::async_trait]
impl<T: SubsumptionLookup + ?Sized> SubsumptionLookup for Arc<T> {
    async fn find_subsumption_sources(&self, type_name: &str) -> Result<BTreeSet<String>> {
        (**self).find_subsumption_sources(type_name).await
    }
}

#[async_trait::async_trait]
impl<T: QueryEngine + ?Sized> QueryEngine for Arc<T> {
    async fn begin_read(&self) -> Result<Box<dyn ReadTransaction>> {
        (**self).begin_read().await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

// ============================================================================
// Tests
// ============================================================================
