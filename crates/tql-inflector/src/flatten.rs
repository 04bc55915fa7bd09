//! Request parameter flattening
//!
//! Collapses the multi-valued request parameter map into substitution values,
//! resolving every CURIE-shaped value to the fragment of its IRI.

use once_cell::sync::Lazy;
use regex::Regex;
use tql_core::{
    fragment_of, CurieResolver, FlattenedParams, ParamValue, ParameterMap, Result, TqlError,
};
use tracing::debug;

static CURIE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][\w.-]*:[^\s]+$").unwrap());

/// Whether `value` has the `PREFIX:LOCAL` shape
pub fn looks_like_curie(value: &str) -> bool {
    CURIE_PATTERN.is_match(value)
}

/// Resolve one raw value
///
/// CURIE-shaped values become the fragment of the smallest resolved IRI;
/// anything else is returned unchanged.
pub fn resolve_value(resolver: &dyn CurieResolver, value: &str) -> Result<String> {
    if !looks_like_curie(value) {
        return Ok(value.to_string());
    }

    let iris = resolver.get_full_uri(value);
    let iri = iris
        .iter()
        .next()
        .ok_or_else(|| TqlError::UnresolvedCurie(value.to_string()))?;
    let fragment = fragment_of(iri);
    debug!(curie = value, iri = %iri, fragment, "Resolved CURIE");
    Ok(fragment.to_string())
}

/// Flatten a parameter map
///
/// One value yields [`ParamValue::Single`]; zero or several yield
/// [`ParamValue::Many`] in request order.
pub fn flatten(resolver: &dyn CurieResolver, params: &ParameterMap) -> Result<FlattenedParams> {
    let mut flattened = FlattenedParams::with_capacity(params.len());
    for (name, values) in params.iter() {
        let value = match values.as_slice() {
            [single] => ParamValue::Single(resolve_value(resolver, single)?),
            many => ParamValue::Many(
                many.iter()
                    .map(|value| resolve_value(resolver, value))
                    .collect::<Result<Vec<_>>>()?,
            ),
        };
        flattened.insert(name.clone(), value);
    }
    Ok(flattened)
}
