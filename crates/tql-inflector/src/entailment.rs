//! Relationship type entailment
//!
//! Expands relationship types to include their sub-types, as recorded by
//! subsumption edges in the graph. Results are recomputed on every call.

use std::collections::BTreeSet;
use std::sync::Arc;
use tql_core::config::EntailmentPolicy;
use tql_core::{Result, SubsumptionLookup};
use tracing::debug;

use crate::template::{self, splice};

/// Expands relationship types through a [`SubsumptionLookup`]
#[derive(Clone)]
pub struct EntailmentExpander {
    lookup: Arc<dyn SubsumptionLookup>,
    policy: EntailmentPolicy,
}

impl EntailmentExpander {
    pub fn new(lookup: Arc<dyn SubsumptionLookup>) -> Self {
        Self {
            lookup,
            policy: EntailmentPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: EntailmentPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> EntailmentPolicy {
        self.policy
    }

    /// The input types plus their sub-types
    pub async fn get_entailed_types(&self, types: &BTreeSet<String>) -> Result<BTreeSet<String>> {
        let mut entailed = types.clone();
        let mut frontier: Vec<String> = types.iter().cloned().collect();

        while !frontier.is_empty() {
            let mut discovered = Vec::new();
            for name in &frontier {
                for source in self.lookup.find_subsumption_sources(name).await? {
                    if entailed.insert(source.clone()) {
                        discovered.push(source);
                    }
                }
            }
            frontier = match self.policy {
                EntailmentPolicy::DirectSubtypes => Vec::new(),
                EntailmentPolicy::Transitive => discovered,
            };
        }
        Ok(entailed)
    }

    /// Entailed types in rendering order: the input first, deduplicated,
    /// then the added types alphabetically
    pub async fn expand(&self, types: &[String]) -> Result<Vec<String>> {
        let mut ordered: Vec<String> = Vec::with_capacity(types.len());
        for name in types {
            if !ordered.contains(name) {
                ordered.push(name.clone());
            }
        }

        let input: BTreeSet<String> = ordered.iter().cloned().collect();
        let entailed = self.get_entailed_types(&input).await?;
        ordered.extend(entailed.into_iter().filter(|name| !input.contains(name)));
        Ok(ordered)
    }

    /// Rewrite every marked type list in `query` to its entailed types
    ///
    /// `[r:foo!]` becomes `[r:foo|fizz]`. Type lists that still hold
    /// placeholders are left as they are.
    pub async fn entail_relationships(&self, query: &str) -> Result<String> {
        let mut replacements = Vec::new();
        for segment in template::entailed_segments(query) {
            let (Some(marker), Some(types)) = (segment.marker, segment.literal_types()) else {
                debug!("Skipping entailment of unsubstituted types at {:?}", segment.span);
                continue;
            };
            let entailed = self.expand(&types).await?;
            debug!(types = ?types, entailed = ?entailed, "Entailed relationship types");

            replacements.push((segment.span, template::join_types(&entailed)));
            replacements.push((marker..marker + 1, String::new()));
        }
        Ok(splice(query, replacements))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Subsumption edges given as (sub-type, super-type) pairs
    #[derive(Default)]
    struct Edges {
        edges: Vec<(&'static str, &'static str)>,
        calls: Mutex<HashMap<String, usize>>,
    }

    impl Edges {
        fn new(edges: Vec<(&'static str, &'static str)>) -> Arc<Self> {
            Arc::new(Self {
                edges,
                calls: Mutex::new(HashMap::new()),
            })
        }
    }

    #[async_trait]
    impl SubsumptionLookup for Edges {
        async fn find_subsumption_sources(&self, type_name: &str) -> Result<BTreeSet<String>> {
            *self
                .calls
                .lock()
                .unwrap()
                .entry(type_name.to_string())
                .or_default() += 1;
            Ok(self
                .edges
                .iter()
                .filter(|(_, parent)| *parent == type_name)
                .map(|(child, _)| child.to_string())
                .collect())
        }
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn expander() -> EntailmentExpander {
        EntailmentExpander::new(Edges::new(vec![
            ("fizz", "foo"),
            ("baz", "bar"),
            ("deep", "fizz"),
        ]))
    }

    #[tokio::test]
    async fn test_single_type_rewrite() {
        let result = expander()
            .entail_relationships("MATCH (n)-[:foo!]-(n2) RETURN n")
            .await
            .unwrap();
        assert_eq!(result, "MATCH (n)-[:foo|fizz]-(n2) RETURN n");
    }

    #[tokio::test]
    async fn test_multiple_types() {
        let types = expander()
            .get_entailed_types(&set(&["foo", "bar"]))
            .await
            .unwrap();
        assert_eq!(types, set(&["foo", "bar", "fizz", "baz"]));
    }

    #[tokio::test]
    async fn test_transitive_policy() {
        let expander = expander().with_policy(EntailmentPolicy::Transitive);
        let types = expander.get_entailed_types(&set(&["foo"])).await.unwrap();
        assert_eq!(types, set(&["foo", "fizz", "deep"]));
    }

    #[tokio::test]
    async fn test_transitive_policy_survives_cycles() {
        let lookup = Edges::new(vec![("a", "b"), ("b", "a")]);
        let expander = EntailmentExpander::new(lookup.clone()).with_policy(EntailmentPolicy::Transitive);
        let types = expander.get_entailed_types(&set(&["a"])).await.unwrap();
        assert_eq!(types, set(&["a", "b"]));
        assert_eq!(lookup.calls.lock().unwrap()["a"], 1);
    }

    #[tokio::test]
    async fn test_superset_of_input() {
        let types = expander()
            .get_entailed_types(&set(&["unknown", "deep"]))
            .await
            .unwrap();
        assert_eq!(types, set(&["unknown", "deep"]));
    }

    #[tokio::test]
    async fn test_expand_order() {
        let ordered = expander()
            .expand(&["bar".to_string(), "foo".to_string(), "bar".to_string()])
            .await
            .unwrap();
        assert_eq!(ordered, vec!["bar", "foo", "baz", "fizz"]);
    }

    #[tokio::test]
    async fn test_rewrite_keeps_surrounding_text() {
        let query = "MATCH (n {name: 'wow!'})-[r:bar|foo *1..2]->(m)-[:foo !]-(o) \
                     WHERE n.x <> 'y!' RETURN n";
        let result = expander().entail_relationships(query).await.unwrap();
        assert_eq!(
            result,
            "MATCH (n {name: 'wow!'})-[r:bar|foo *1..2]->(m)-[:foo|fizz ]-(o) \
             WHERE n.x <> 'y!' RETURN n"
        );
    }

    #[tokio::test]
    async fn test_type_without_subtypes_loses_marker() {
        let result = expander()
            .entail_relationships("MATCH (a)-[:RO_123!]-(b) RETURN a")
            .await
            .unwrap();
        assert_eq!(result, "MATCH (a)-[:RO_123]-(b) RETURN a");
    }

    #[tokio::test]
    async fn test_unsubstituted_segment_left_alone() {
        let query = "MATCH (a)-[:${rel}!]-(b) RETURN a";
        assert_eq!(expander().entail_relationships(query).await.unwrap(), query);
    }

    #[tokio::test]
    async fn test_lookup_failure_propagates() {
        struct Failing;

        #[async_trait]
        impl SubsumptionLookup for Failing {
            async fn find_subsumption_sources(&self, _: &str) -> Result<BTreeSet<String>> {
                Err(tql_core::TqlError::QueryExecutionFailed("store offline".into()))
            }
        }

        let expander = EntailmentExpander::new(Arc::new(Failing));
        assert!(expander.entail_relationships("[:x!]").await.is_err());
        // No marker, no lookup
        assert_eq!(expander.entail_relationships("[:x]").await.unwrap(), "[:x]");
    }
}
