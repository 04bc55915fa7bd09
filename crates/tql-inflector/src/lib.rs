//! TQL Inflector - Templated query inflation
//!
//! Turns a query template and loosely typed request parameters into a
//! concrete graph query, runs it, and returns the result subgraph:
//!
//! 1. flatten parameters, resolving CURIEs to IRI fragments;
//! 2. substitute `${name}` placeholders;
//! 3. expand `!`-marked relationship types through the subsumption hierarchy;
//! 4. execute in a read transaction and merge the cells into a [`ResultGraph`].
//!
//! Author: hephaex@gmail.com

use std::collections::BTreeSet;
use std::sync::Arc;
use tql_core::config::EntailmentPolicy;
use tql_core::result::ResultGraph;
use tql_core::{
    CurieResolver, FlattenedParams, ParameterMap, QueryEngine, Result, SubsumptionLookup,
};
use tracing::{debug, info};

pub mod curie;
pub mod entailment;
pub mod flatten;
pub mod materialize;
pub mod template;

pub use curie::CurieMap;
pub use entailment::EntailmentExpander;

/// Query inflation pipeline over its three collaborators
#[derive(Clone)]
pub struct CypherInflector {
    curies: Arc<dyn CurieResolver>,
    entailment: EntailmentExpander,
    engine: Arc<dyn QueryEngine>,
}

impl CypherInflector {
    pub fn new(
        curies: Arc<dyn CurieResolver>,
        subsumption: Arc<dyn SubsumptionLookup>,
        engine: Arc<dyn QueryEngine>,
    ) -> Self {
        Self {
            curies,
            entailment: EntailmentExpander::new(subsumption),
            engine,
        }
    }

    pub fn with_policy(mut self, policy: EntailmentPolicy) -> Self {
        self.entailment = self.entailment.with_policy(policy);
        self
    }

    pub fn engine(&self) -> &Arc<dyn QueryEngine> {
        &self.engine
    }

    /// Collapse request parameters into substitution values
    pub fn flatten(&self, params: &ParameterMap) -> Result<FlattenedParams> {
        flatten::flatten(self.curies.as_ref(), params)
    }

    pub async fn get_entailed_relationship_types(
        &self,
        types: &BTreeSet<String>,
    ) -> Result<BTreeSet<String>> {
        self.entailment.get_entailed_types(types).await
    }

    /// Rewrite `!`-marked relationship types to their entailed types
    pub async fn entail_relationships(&self, query: &str) -> Result<String> {
        self.entailment.entail_relationships(query).await
    }

    pub fn substitute_placeholders(
        &self,
        template: &str,
        values: &FlattenedParams,
    ) -> Result<String> {
        template::substitute_placeholders(template, values)
    }

    /// Placeholders first, then entailment
    pub async fn substitute(&self, template: &str, values: &FlattenedParams) -> Result<String> {
        let query = self.substitute_placeholders(template, values)?;
        self.entail_relationships(&query).await
    }

    /// The final query for a template and its request parameters
    pub async fn render(&self, template: &str, params: &ParameterMap) -> Result<String> {
        let values = self.flatten(params)?;
        let query = self.substitute(template, &values).await?;
        debug!("Rendered query: {}", query);
        Ok(query)
    }

    pub async fn execute(&self, query: &str) -> Result<ResultGraph> {
        materialize::execute(self.engine.as_ref(), query).await
    }

    /// Render and execute; nothing runs if rendering fails
    pub async fn inflate(&self, template: &str, params: &ParameterMap) -> Result<ResultGraph> {
        let query = self.render(template, params).await?;
        let graph = self.execute(&query).await?;
        info!(
            "Inflated query returned {} vertices, {} edges",
            graph.vertex_count(),
            graph.edge_count()
        );
        Ok(graph)
    }
}
