//! Prefix-map CURIE resolution

use std::collections::{BTreeMap, BTreeSet};
use tql_core::CurieResolver;

/// CURIE resolver over a prefix -> IRI base table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurieMap {
    prefixes: BTreeMap<String, String>,
}

impl CurieMap {
    pub fn new(prefixes: BTreeMap<String, String>) -> Self {
        Self { prefixes }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>, base: impl Into<String>) -> Self {
        self.prefixes.insert(prefix.into(), base.into());
        self
    }

    pub fn prefixes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.prefixes.iter().map(|(p, b)| (p.as_str(), b.as_str()))
    }

    /// Compact form of `iri` under the longest matching base
    pub fn get_curie(&self, iri: &str) -> Option<String> {
        self.prefixes
            .iter()
            .filter(|(_, base)| {
                !base.is_empty() && iri.len() > base.len() && iri.starts_with(base.as_str())
            })
            .max_by_key(|(_, base)| base.len())
            .map(|(prefix, base)| format!("{prefix}:{}", &iri[base.len()..]))
    }
}

impl CurieResolver for CurieMap {
    fn get_full_uri(&self, curie: &str) -> BTreeSet<String> {
        let mut iris = BTreeSet::new();
        if let Some((prefix, local)) = curie.split_once(':') {
            if let Some(base) = self.prefixes.get(prefix) {
                if !local.is_empty() {
                    iris.insert(format!("{base}{local}"));
                }
            }
        }
        iris
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CurieMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(prefix, base)| (prefix.into(), base.into()))
                .collect(),
        )
    }
}
