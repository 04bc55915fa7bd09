//! Subsumption lookup over a query engine
//!
//! Finds the direct sub-types of a relationship type by querying the graph
//! for nodes pointing at the type's node through the subsumption relation.

use async_trait::async_trait;
use futures::TryStreamExt;
use std::collections::BTreeSet;
use tql_core::{Cell, QueryEngine, Result, SubsumptionLookup};
use tracing::debug;

use crate::FRAGMENT_PROPERTY;

/// Default subsumption relationship type
pub const SUB_PROPERTY_OF: &str = "subPropertyOf";

/// [`SubsumptionLookup`] answered by querying a [`QueryEngine`]
///
/// Each lookup runs in its own read transaction.
pub struct EngineSubsumption<E> {
    engine: E,
    subsumption_type: String,
    fragment_property: String,
}

impl<E: QueryEngine> EngineSubsumption<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            subsumption_type: SUB_PROPERTY_OF.to_string(),
            fragment_property: FRAGMENT_PROPERTY.to_string(),
        }
    }

    /// Use a different subsumption relationship and name property
    pub fn with_schema(
        mut self,
        subsumption_type: impl Into<String>,
        fragment_property: impl Into<String>,
    ) -> Self {
        self.subsumption_type = subsumption_type.into();
        self.fragment_property = fragment_property.into();
        self
    }

    fn lookup_query(&self, type_name: &str) -> String {
        let name = type_name.replace('\\', "\\\\").replace('\'', "\\'");
        format!(
            "MATCH (parent {{`{prop}`: '{name}'}})<-[:`{rel}`]-(child) \
             RETURN DISTINCT child.`{prop}` AS child",
            prop = self.fragment_property.replace('`', "``"),
            rel = self.subsumption_type.replace('`', "``"),
        )
    }
}

#[async_trait]
impl<E: QueryEngine> SubsumptionLookup for EngineSubsumption<E> {
    async fn find_subsumption_sources(&self, type_name: &str) -> Result<BTreeSet<String>> {
        let query = self.lookup_query(type_name);
        let mut tx = self.engine.begin_read().await?;
        let mut rows = tx.execute(&query).await?;

        let mut sources = BTreeSet::new();
        while let Some(row) = rows.try_next().await? {
            if let Some(Cell::Scalar(serde_json::Value::String(child))) = row.get("child") {
                sources.insert(child.clone());
            }
        }

        debug!(type_name, sources = ?sources, "Subsumption sources");
        Ok(sources)
    }
}
